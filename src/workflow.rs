//! The upload and delete sagas.
//!
//! A workflow authorizes the caller once through the `verify` worker and
//! then runs its steps strictly in order. A failing step never halts the
//! pipeline, its outcome is recorded and the next step runs.

use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing_futures::Instrument;
use uuid::Uuid;

use crate::envelope::{is_warmer, GatewayResponse, PhotoRequest};
use crate::errors::WorkflowError;
use crate::invoker::{WorkerInvoker, WorkerOutcome};
use crate::workers::WorkerName;

/// One activity of a workflow.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub label: &'static str,
    pub description: &'static str,
    pub worker: WorkerName,
}

#[derive(Debug, Clone, Copy)]
pub struct Workflow {
    pub name: &'static str,
    pub steps: &'static [Step],
}

pub const UPLOAD: Workflow = Workflow {
    name: "upload",
    steps: &[
        Step {
            label: "Database",
            description: "DB Insert",
            worker: WorkerName::InsertPhotoRecord,
        },
        Step {
            label: "Original_S3",
            description: "Original Upload",
            worker: WorkerName::PutObject,
        },
        Step {
            label: "Resize_S3",
            description: "Resize Upload",
            worker: WorkerName::ResizeAndPut,
        },
    ],
};

pub const DELETE: Workflow = Workflow {
    name: "delete",
    steps: &[
        Step {
            label: "DB_Delete",
            description: "Delete Photo Record",
            worker: WorkerName::DeletePhotoRecord,
        },
        Step {
            label: "Original_Delete",
            description: "Delete Original Object",
            worker: WorkerName::DeleteObject,
        },
        Step {
            label: "Resized_Delete",
            description: "Delete Resized Object",
            worker: WorkerName::DeleteResizedObject,
        },
    ],
};

/// The ordered `activity -> outcome` mapping returned by a completed run.
#[derive(Debug, Default)]
pub struct ActivityReport(Vec<(String, WorkerOutcome)>);

impl ActivityReport {
    fn record(&mut self, activity: String, outcome: WorkerOutcome) {
        self.0.push((activity, outcome));
    }

    fn failures(&self) -> usize {
        self.0.iter().filter(|(_, outcome)| outcome.is_failure()).count()
    }
}

impl Serialize for ActivityReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, outcome)| (name, outcome)))
    }
}

#[inline]
fn activity_name(index: usize, step: &Step) -> String {
    format!("Activity_{}_{}", index + 1, step.label)
}

impl Workflow {
    /// Runs the workflow against a raw request body.
    pub async fn run(&self, invoker: &WorkerInvoker, body: &str) -> GatewayResponse {
        if is_warmer(body) {
            info!(workflow = self.name, "Warming event received");
            return GatewayResponse::warmed();
        }

        let span = info_span!("workflow", name = self.name, invocation = %Uuid::new_v4());
        let result = self.execute(invoker, body).instrument(span).await;

        match result {
            Ok(report) => GatewayResponse::json(200, &report),
            Err(e) => {
                warn!(workflow = self.name, error = %e, "Workflow refused");
                e.into_response()
            },
        }
    }

    async fn execute(&self, invoker: &WorkerInvoker, body: &str) -> Result<ActivityReport, WorkflowError> {
        let request = PhotoRequest::parse(body).map_err(WorkflowError::MalformedRequest)?;
        let (email, token) = request.credentials().ok_or(WorkflowError::MissingCredentials)?;

        authorize(invoker, email, token).await?;

        let mut report = ActivityReport::default();
        for (i, step) in self.steps.iter().enumerate() {
            info!("Activity {}: {}", i + 1, step.description);

            let outcome = invoker.invoke(step.worker, body).await;
            if outcome.is_failure() {
                warn!(worker = %step.worker, outcome = %outcome, "Activity failed, continuing");
            }

            report.record(activity_name(i, step), outcome);
        }

        info!(failures = report.failures(), "Workflow complete");
        Ok(report)
    }
}

/// Asks the `verify` worker whether `token` belongs to `email`.
///
/// A verifier which cannot be reached or reports an internal error is a
/// server fault, never a denial.
async fn authorize(invoker: &WorkerInvoker, email: &str, token: &str) -> Result<(), WorkflowError> {
    let payload = json!({ "email": email, "token": token }).to_string();

    let response = invoker
        .call(WorkerName::Verify, &payload)
        .await
        .map_err(|e| WorkflowError::AuthoritySubsystemUnavailable(e.to_string()))?;

    let verdict: Value = serde_json::from_str(&response.body).map_err(|_| {
        WorkflowError::AuthoritySubsystemUnavailable(format!(
            "unreadable verifier response ({}): {}",
            response.status_code, response.body
        ))
    })?;

    if let Some(error) = verdict.get("error") {
        let reason = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
        return Err(WorkflowError::AuthoritySubsystemUnavailable(reason));
    }

    match verdict.get("valid").and_then(Value::as_bool) {
        Some(true) => Ok(()),
        _ => Err(WorkflowError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;
    use crate::envelope::WorkerEnvelope;
    use crate::invoker::WorkerTransport;

    /// Answers from a table of canned bodies and records every call in order.
    #[derive(Default)]
    struct ScriptedTransport {
        answers: HashMap<WorkerName, Result<Value, String>>,
        calls: Mutex<Vec<(WorkerName, String)>>,
    }

    impl ScriptedTransport {
        fn answer(mut self, worker: WorkerName, status: u16, body: &str) -> Self {
            self.answers
                .insert(worker, Ok(json!({ "statusCode": status, "body": body })));
            self
        }

        fn fail(mut self, worker: WorkerName, reason: &str) -> Self {
            self.answers.insert(worker, Err(reason.to_string()));
            self
        }

        fn workers_called(&self) -> Vec<WorkerName> {
            self.calls.lock().unwrap().iter().map(|(w, _)| *w).collect()
        }
    }

    #[async_trait]
    impl WorkerTransport for ScriptedTransport {
        async fn invoke(&self, worker: WorkerName, envelope: WorkerEnvelope) -> anyhow::Result<Value> {
            self.calls.lock().unwrap().push((worker, envelope.body));
            match self.answers.get(&worker) {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(reason)) => Err(anyhow!("{}", reason)),
                None => Ok(json!({ "statusCode": 200, "body": "ok" })),
            }
        }
    }

    fn valid() -> ScriptedTransport {
        ScriptedTransport::default().answer(WorkerName::Verify, 200, r#"{"valid": true}"#)
    }

    const REQUEST: &str = r#"{"email":"a@x.com","token":"t0k","key":"cat.png","content":"AAAA"}"#;

    fn report_of(resp: &GatewayResponse) -> Value {
        serde_json::from_str(&resp.body).unwrap()
    }

    #[tokio::test]
    async fn upload_runs_every_step_in_order() {
        let transport = Arc::new(
            valid()
                .answer(WorkerName::InsertPhotoRecord, 200, r#"{"message":"Metadata saved"}"#)
                .answer(
                    WorkerName::PutObject,
                    200,
                    r#"{"message":"Object uploaded successfully: cat.png"}"#,
                )
                .answer(
                    WorkerName::ResizeAndPut,
                    200,
                    "Success: Resized and uploaded resized-cat.png",
                ),
        );
        let invoker = WorkerInvoker::new(transport.clone());

        let resp = UPLOAD.run(&invoker, REQUEST).await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(
            report_of(&resp),
            json!({
                "Activity_1_Database": "Metadata saved",
                "Activity_2_Original_S3": "Object uploaded successfully: cat.png",
                "Activity_3_Resize_S3": "Success: Resized and uploaded resized-cat.png",
            }),
        );

        assert_eq!(
            transport.workers_called(),
            vec![
                WorkerName::Verify,
                WorkerName::InsertPhotoRecord,
                WorkerName::PutObject,
                WorkerName::ResizeAndPut,
            ],
        );

        // Workers receive the caller's body untouched.
        let calls = transport.calls.lock().unwrap();
        assert!(calls[1..].iter().all(|(_, body)| body == REQUEST));
    }

    #[tokio::test]
    async fn report_keeps_activity_order() {
        let invoker = WorkerInvoker::new(Arc::new(valid()));
        let resp = DELETE.run(&invoker, REQUEST).await;

        let first = resp.body.find("Activity_1_DB_Delete").unwrap();
        let second = resp.body.find("Activity_2_Original_Delete").unwrap();
        let third = resp.body.find("Activity_3_Resized_Delete").unwrap();
        assert!(first < second && second < third);
    }

    #[tokio::test]
    async fn invalid_token_stops_before_any_worker() {
        let transport = Arc::new(
            ScriptedTransport::default().answer(
                WorkerName::Verify,
                401,
                r#"{"valid": false, "message": "Signature Mismatch"}"#,
            ),
        );
        let invoker = WorkerInvoker::new(transport.clone());

        let resp = UPLOAD.run(&invoker, REQUEST).await;
        assert_eq!(resp.status_code, 401);
        assert_eq!(resp.body, r#"{"error":"Unauthorized: Invalid Token"}"#);
        assert_eq!(transport.workers_called(), vec![WorkerName::Verify]);
    }

    #[tokio::test]
    async fn verifier_outage_is_a_server_error() {
        let transport = Arc::new(ScriptedTransport::default().fail(WorkerName::Verify, "timed out"));
        let invoker = WorkerInvoker::new(transport.clone());

        let resp = DELETE.run(&invoker, REQUEST).await;
        assert_eq!(resp.status_code, 500);
        assert_eq!(transport.workers_called(), vec![WorkerName::Verify]);

        let transport = Arc::new(ScriptedTransport::default().answer(
            WorkerName::Verify,
            500,
            r#"{"valid": false, "error": "signing key unavailable"}"#,
        ));
        let resp = DELETE.run(&WorkerInvoker::new(transport), REQUEST).await;
        assert_eq!(resp.status_code, 500);
        assert_eq!(resp.body, r#"{"error":"Verifier Error: signing key unavailable"}"#);
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected_without_calls() {
        let transport = Arc::new(valid());
        let invoker = WorkerInvoker::new(transport.clone());

        let resp = UPLOAD.run(&invoker, r#"{"email":"a@x.com","key":"cat.png"}"#).await;
        assert_eq!(resp.status_code, 400);

        let resp = UPLOAD.run(&invoker, "definitely not json").await;
        assert_eq!(resp.status_code, 400);
        assert!(transport.workers_called().is_empty());
    }

    #[tokio::test]
    async fn warmer_skips_authorization() {
        let transport = Arc::new(valid());
        let invoker = WorkerInvoker::new(transport.clone());

        let resp = UPLOAD.run(&invoker, "{warmer:true}").await;
        assert_eq!(resp, GatewayResponse::warmed());
        assert!(transport.workers_called().is_empty());
    }

    #[tokio::test]
    async fn failing_steps_do_not_halt_the_pipeline() {
        let transport = Arc::new(
            valid()
                .answer(WorkerName::DeletePhotoRecord, 404, "Warning: Row not found in DB")
                .fail(WorkerName::DeleteObject, "connection refused")
                .answer(WorkerName::DeleteResizedObject, 200, "Success: Deleted resized-cat.png"),
        );
        let invoker = WorkerInvoker::new(transport.clone());

        let resp = DELETE.run(&invoker, REQUEST).await;
        assert_eq!(resp.status_code, 200);
        assert_eq!(
            report_of(&resp),
            json!({
                "Activity_1_DB_Delete": "Warning: Row not found in DB",
                "Activity_2_Original_Delete": "Failed: connection refused",
                "Activity_3_Resized_Delete": "Success: Deleted resized-cat.png",
            }),
        );
        assert_eq!(transport.workers_called().len(), 4);
    }

    #[tokio::test]
    async fn structured_errors_are_labelled() {
        let transport = Arc::new(
            valid().answer(WorkerName::InsertPhotoRecord, 200, r#"{"error":"DB Insert Failed: locked"}"#),
        );
        let invoker = WorkerInvoker::new(transport);

        let resp = UPLOAD.run(&invoker, REQUEST).await;
        assert_eq!(report_of(&resp)["Activity_1_Database"], "Error: DB Insert Failed: locked");
    }

    #[test]
    fn report_counts_failures() {
        let mut report = ActivityReport::default();
        report.record("Activity_1_X".into(), WorkerOutcome::PlainText("done".into()));
        report.record("Activity_2_Y".into(), WorkerOutcome::InvocationFailed("gone".into()));
        report.record("Activity_3_Z".into(), WorkerOutcome::StructuredError("bad".into()));
        assert_eq!(report.failures(), 2);
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"Activity_1_X":"done","Activity_2_Y":"Failed: gone","Activity_3_Z":"Error: bad"}"#,
        );
    }
}
