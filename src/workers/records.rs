use crate::database::PhotoRecord;
use crate::envelope::{GatewayResponse, PhotoRequest};
use crate::workers::auth::authorize;
use crate::workers::{request_with_key, WorkerContext};

pub(super) async fn insert(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let (request, key) = match request_with_key(body) {
        Ok(parsed) => parsed,
        Err(resp) => return resp,
    };

    if request.credentials().is_none() {
        return GatewayResponse::json(400, &json!({ "error": "Missing email or token" }));
    }

    if let Some(rejection) = authorize(ctx, &request).await.rejection("Verifier Failed") {
        return rejection;
    }

    let record = PhotoRecord {
        key,
        description: request
            .description
            .unwrap_or_else(|| ctx.settings.description_default.clone()),
        email: request.email,
    };

    match ctx.index.insert(&record).await {
        Ok(()) => {
            info!(key = %record.key, "DB insert successful");
            GatewayResponse::json(200, &json!({ "message": "Metadata saved" }))
        },
        Err(e) => {
            // Reported with a 200 so an orchestration carries on.
            error!(key = %record.key, error = %e, "DB insert failed");
            GatewayResponse::json(200, &json!({ "error": format!("DB Insert Failed: {}", e) }))
        },
    }
}

pub(super) async fn delete(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let key = match request_with_key(body) {
        Ok((_, key)) => key,
        Err(resp) => return resp,
    };

    match ctx.index.remove(&key).await {
        Ok(true) => {
            info!(key = %key, "Row deleted");
            GatewayResponse::new(200, "Success: Row deleted from DB")
        },
        Ok(false) => {
            warn!(key = %key, "No row to delete");
            GatewayResponse::new(404, "Warning: Row not found in DB")
        },
        Err(e) => {
            error!(key = %key, error = %e, "DB delete failed");
            GatewayResponse::new(500, format!("Error deleting from DB: {}", e))
        },
    }
}

pub(super) async fn list(ctx: &WorkerContext, body: &str) -> GatewayResponse {
    let request = match PhotoRequest::parse(body) {
        Ok(request) => request,
        Err(e) => {
            return GatewayResponse::json(400, &json!({ "error": format!("Invalid Request: {}", e) }))
        },
    };

    if request.credentials().is_none() {
        return GatewayResponse::json(
            401,
            &json!({ "error": "Unauthorized: Missing email or token" }),
        );
    }

    if let Some(rejection) = authorize(ctx, &request).await.rejection("Verifier Error") {
        return rejection;
    }

    let records = match ctx.index.list().await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Unable to list photo records");
            return GatewayResponse::json(500, &json!({ "error": format!("Server Error: {}", e) }));
        },
    };

    let items: Vec<_> = records
        .into_iter()
        .map(|record| {
            json!({
                "key": record.key,
                "description": record.description,
                "email": record.email.unwrap_or_else(|| "Unknown".to_string()),
            })
        })
        .collect();

    GatewayResponse::json(200, &items)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::workers::test_support::{context, token_for};

    fn signed(extra: Value) -> String {
        let mut doc = json!({ "email": "a@x.com", "token": token_for("a@x.com") });
        if let (Some(doc), Value::Object(extra)) = (doc.as_object_mut(), extra) {
            doc.extend(extra);
        }
        doc.to_string()
    }

    #[tokio::test]
    async fn insert_defaults_the_description() {
        let (ctx, _dir) = context().await;

        let resp = insert(&ctx, &signed(json!({ "key": "cat.png" }))).await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, r#"{"message":"Metadata saved"}"#);

        let records = ctx.index.list().await.unwrap();
        assert_eq!(
            records,
            vec![PhotoRecord {
                key: "cat.png".into(),
                description: "No description".into(),
                email: Some("a@x.com".into()),
            }],
        );
    }

    #[tokio::test]
    async fn insert_rejects_bad_tokens() {
        let (ctx, _dir) = context().await;
        let body = json!({ "email": "a@x.com", "token": "forged", "key": "cat.png" }).to_string();

        let resp = insert(&ctx, &body).await;
        assert_eq!(resp.status_code, 401);
        assert!(ctx.index.list().await.unwrap().is_empty());

        let resp = insert(&ctx, r#"{"key":"cat.png"}"#).await;
        assert_eq!(resp.status_code, 400);
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let (ctx, _dir) = context().await;
        insert(&ctx, &signed(json!({ "key": "cat.png", "description": "a cat" }))).await;

        let first = delete(&ctx, r#"{"key":"cat.png"}"#).await;
        assert_eq!(first, GatewayResponse::new(200, "Success: Row deleted from DB"));

        let second = delete(&ctx, r#"{"key":"cat.png"}"#).await;
        assert_eq!(second, GatewayResponse::new(404, "Warning: Row not found in DB"));
    }

    #[tokio::test]
    async fn list_fills_in_unknown_emails() {
        let (ctx, _dir) = context().await;
        ctx.index
            .insert(&PhotoRecord {
                key: "old.png".into(),
                description: "legacy".into(),
                email: None,
            })
            .await
            .unwrap();

        let resp = list(&ctx, &signed(json!({}))).await;
        assert_eq!(resp.status_code, 200);

        let items: Value = serde_json::from_str(&resp.body).unwrap();
        assert_eq!(items, json!([{ "key": "old.png", "description": "legacy", "email": "Unknown" }]));
    }

    #[tokio::test]
    async fn list_requires_credentials() {
        let (ctx, _dir) = context().await;
        let resp = list(&ctx, "{}").await;
        assert_eq!(resp.status_code, 401);
        assert_eq!(resp.body, r#"{"error":"Unauthorized: Missing email or token"}"#);
    }
}
