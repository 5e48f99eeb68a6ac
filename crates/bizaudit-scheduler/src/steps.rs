//! Step handlers: one per [`StepAction`] variant.
//!
//! Each handler takes the accumulated step input and returns a JSON result.
//! A result carries a `success` flag; handlers return `Err` only for collaborator
//! failures, which the executor turns into `{success:false, error}`.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use bizaudit_core::error::{BizAuditError, Result};
use bizaudit_core::template::{lookup_path, substitute};
use bizaudit_core::traits::{CompletionProvider, EmailSender, GenerateParams};
use bizaudit_core::types::OutgoingEmail;

use crate::dispatch;
use crate::processor::SYSTEM_PROMPT;
use crate::workflow::{
    AiProcessConfig, ConditionConfig, ConditionOperator, DataTransformConfig, EmailSendConfig,
    StepAction, WebhookCallConfig,
};

pub const UNKNOWN_STEP_TYPE: &str = "Unknown step type";

pub struct StepRunner {
    provider: Arc<dyn CompletionProvider>,
    mailer: Arc<dyn EmailSender>,
    http: reqwest::Client,
    params: GenerateParams,
}

impl StepRunner {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        mailer: Arc<dyn EmailSender>,
        params: GenerateParams,
    ) -> Self {
        Self {
            provider,
            mailer,
            http: reqwest::Client::new(),
            params,
        }
    }

    /// Handler failures come back as `BizAuditError::Step`, tagged with the step type.
    pub async fn run(&self, action: &StepAction, input: &Value) -> Result<Value> {
        let outcome = match action {
            StepAction::AiProcess(c) => self.ai_process(c, input).await,
            StepAction::EmailSend(c) => self.email_send(c, input).await,
            StepAction::DataTransform(c) => Ok(data_transform(c, input)),
            StepAction::WebhookCall(c) => self.webhook_call(c, input).await,
            StepAction::Condition(c) => Ok(condition(c, input)),
            StepAction::Unknown { step_type, .. } => {
                tracing::warn!("⚠️ Unknown step type '{step_type}'");
                Ok(json!({"success": false, "error": UNKNOWN_STEP_TYPE}))
            }
        };
        outcome.map_err(|e| BizAuditError::Step(format!("{}: {e}", action.step_type())))
    }

    async fn ai_process(&self, config: &AiProcessConfig, input: &Value) -> Result<Value> {
        let prompt = substitute(&config.prompt, input);
        let system = config
            .system_prompt
            .as_deref()
            .map(|s| substitute(s, input))
            .unwrap_or_else(|| SYSTEM_PROMPT.to_string());
        let params = GenerateParams {
            model: self.params.model.clone(),
            max_tokens: config.max_tokens.unwrap_or(self.params.max_tokens),
            temperature: config.temperature.unwrap_or(self.params.temperature),
        };

        let text = self.provider.complete(&system, &prompt, &params).await?;
        Ok(json!({"success": true, "text": text}))
    }

    async fn email_send(&self, config: &EmailSendConfig, input: &Value) -> Result<Value> {
        let email = OutgoingEmail {
            to: substitute(&config.to, input),
            subject: substitute(&config.subject, input),
            body: substitute(&config.template, input),
        };
        self.mailer.send(&email).await?;
        Ok(json!({
            "success": true,
            "to": email.to,
            "subject": email.subject,
            "transport": self.mailer.name(),
        }))
    }

    async fn webhook_call(&self, config: &WebhookCallConfig, input: &Value) -> Result<Value> {
        let url = substitute(&config.url, input);
        let body = match &config.body {
            Some(body) => render_value(body, input),
            None => input.clone(),
        };
        let resp =
            dispatch::send_webhook(&self.http, &url, &config.method, &config.headers, &body).await?;
        Ok(json!({
            "success": resp.is_success(),
            "status": resp.status,
            "response": resp.body,
        }))
    }
}

/// Build a new object from input paths and constants.
pub fn data_transform(config: &DataTransformConfig, input: &Value) -> Value {
    let mut out = Map::new();
    for (key, path) in &config.mappings {
        let value = lookup_path(input, path).cloned().unwrap_or(Value::Null);
        out.insert(key.clone(), value);
    }
    for (key, value) in &config.set {
        out.insert(key.clone(), render_value(value, input));
    }
    out.entry("success").or_insert(Value::Bool(true));
    Value::Object(out)
}

/// Compare one input field. `success` is whether the comparison held.
pub fn condition(config: &ConditionConfig, input: &Value) -> Value {
    let actual = lookup_path(input, &config.field);
    let matched = evaluate(config.operator, actual, &config.value);
    json!({
        "success": matched,
        "matched": matched,
        "field": config.field,
        "actual": actual.cloned().unwrap_or(Value::Null),
    })
}

fn evaluate(operator: ConditionOperator, actual: Option<&Value>, expected: &Value) -> bool {
    match operator {
        ConditionOperator::Exists => actual.is_some_and(|v| !v.is_null()),
        ConditionOperator::Equals => actual.is_some_and(|v| loosely_equal(v, expected)),
        ConditionOperator::NotEquals => !actual.is_some_and(|v| loosely_equal(v, expected)),
        ConditionOperator::Contains => match actual {
            Some(Value::String(s)) => s.contains(&as_text(expected)),
            Some(Value::Array(items)) => items.iter().any(|i| loosely_equal(i, expected)),
            Some(Value::Object(map)) => expected.as_str().is_some_and(|k| map.contains_key(k)),
            _ => false,
        },
        ConditionOperator::GreaterThan => compare(actual, expected).is_some_and(|(a, b)| a > b),
        ConditionOperator::LessThan => compare(actual, expected).is_some_and(|(a, b)| a < b),
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<(f64, f64)> {
    Some((as_number(actual?)?, as_number(expected)?))
}

/// Numbers compare numerically, `"5"` equals `5`, everything else structurally.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y)
        }
        _ => false,
    }
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute placeholders in every string of a JSON value.
pub fn render_value(value: &Value, fields: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(substitute(s, fields)),
        Value::Array(items) => Value::Array(items.iter().map(|i| render_value(i, fields)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, fields)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::LogSender;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Echoes the prompt and remembers the params it was called with.
    #[derive(Default)]
    struct EchoProvider {
        seen: Mutex<Vec<(String, GenerateParams)>>,
    }

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, _s: &str, user: &str, params: &GenerateParams) -> Result<String> {
            self.seen.lock().unwrap().push((user.to_string(), params.clone()));
            Ok(format!("echo: {user}"))
        }
    }

    struct DownProvider;

    #[async_trait]
    impl CompletionProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _s: &str, _u: &str, _p: &GenerateParams) -> Result<String> {
            Err(BizAuditError::Service("offline".into()))
        }
    }

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> ConditionConfig {
        ConditionConfig {
            field: field.into(),
            operator,
            value,
        }
    }

    #[tokio::test]
    async fn test_ai_process_substitutes_and_overrides_params() {
        let provider = Arc::new(EchoProvider::default());
        let runner = StepRunner::new(provider.clone(), Arc::new(LogSender::new()), GenerateParams::default());
        let action = StepAction::AiProcess(AiProcessConfig {
            prompt: "Audit {{business}}".into(),
            system_prompt: None,
            max_tokens: Some(120),
            temperature: None,
        });
        let out = runner.run(&action, &json!({"business": "Cafe Luna"})).await.unwrap();
        assert_eq!(out, json!({"success": true, "text": "echo: Audit Cafe Luna"}));

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].1.max_tokens, 120);
        assert_eq!(seen[0].1.temperature, GenerateParams::default().temperature);
    }

    #[tokio::test]
    async fn test_ai_process_failure_is_err() {
        let runner = StepRunner::new(Arc::new(DownProvider), Arc::new(LogSender::new()), GenerateParams::default());
        let action = StepAction::AiProcess(AiProcessConfig {
            prompt: "x".into(),
            system_prompt: None,
            max_tokens: None,
            temperature: None,
        });
        let err = runner.run(&action, &json!({})).await.unwrap_err();
        assert!(matches!(err, BizAuditError::Step(_)));
        assert!(err.to_string().contains("ai-process"));
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn test_email_send_renders_fields() {
        let mailer = Arc::new(LogSender::new());
        let runner = StepRunner::new(Arc::new(EchoProvider::default()), mailer.clone(), GenerateParams::default());
        let action = StepAction::EmailSend(EmailSendConfig {
            to: "{{email}}".into(),
            subject: "Your audit, {{name}}".into(),
            template: "{{previousResult.text}}".into(),
        });
        let input = json!({"email": "ana@shop.test", "name": "Ana", "previousResult": {"text": "All good"}});
        let out = runner.run(&action, &input).await.unwrap();
        assert_eq!(out["success"], true);

        let sent = mailer.sent();
        assert_eq!(sent[0].to, "ana@shop.test");
        assert_eq!(sent[0].subject, "Your audit, Ana");
        assert_eq!(sent[0].body, "All good");
    }

    #[tokio::test]
    async fn test_unknown_step_fails_in_band() {
        let runner = StepRunner::new(Arc::new(EchoProvider::default()), Arc::new(LogSender::new()), GenerateParams::default());
        let action = StepAction::Unknown {
            step_type: "sms-send".into(),
            config: json!({}),
        };
        let out = runner.run(&action, &json!({})).await.unwrap();
        assert_eq!(out, json!({"success": false, "error": "Unknown step type"}));
    }

    #[test]
    fn test_data_transform() {
        let mut config = DataTransformConfig::default();
        config.mappings.insert("company".into(), "lead.businessName".into());
        config.mappings.insert("missing".into(), "lead.nope".into());
        config.set.insert("stage".into(), json!("qualified"));
        config.set.insert("greeting".into(), json!("Hi {{lead.contactName}}"));

        let input = json!({"lead": {"businessName": "Cafe Luna", "contactName": "Ana"}});
        let out = data_transform(&config, &input);
        assert_eq!(out["company"], "Cafe Luna");
        assert_eq!(out["missing"], Value::Null);
        assert_eq!(out["stage"], "qualified");
        assert_eq!(out["greeting"], "Hi Ana");
        assert_eq!(out["success"], true);
    }

    #[test]
    fn test_condition_operators() {
        let input = json!({"score": 82, "tags": ["hot", "small"], "note": "wants demo", "size": "5"});
        let check = |c: ConditionConfig| condition(&c, &input)["success"].as_bool().unwrap();

        assert!(check(cond("score", ConditionOperator::GreaterThan, json!(70))));
        assert!(!check(cond("score", ConditionOperator::LessThan, json!(70))));
        assert!(check(cond("score", ConditionOperator::Equals, json!(82.0))));
        assert!(check(cond("size", ConditionOperator::Equals, json!(5))));
        assert!(check(cond("tags", ConditionOperator::Contains, json!("hot"))));
        assert!(check(cond("note", ConditionOperator::Contains, json!("demo"))));
        assert!(check(cond("note", ConditionOperator::Exists, Value::Null)));
        assert!(!check(cond("absent", ConditionOperator::Exists, Value::Null)));
        assert!(check(cond("absent", ConditionOperator::NotEquals, json!(1))));
        assert!(!check(cond("absent", ConditionOperator::GreaterThan, json!(1))));
    }

    /// One-shot HTTP server: answers the first request with `status` and a JSON
    /// body, and hands back the raw request it received.
    async fn serve_once(status: u16, reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if raw.len() >= end + 4 + length || n == 0 {
                        break;
                    }
                } else if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{reply}",
                reply.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (url, handle)
    }

    fn webhook(url: String, method: &str, body: Option<Value>) -> StepAction {
        let mut headers = BTreeMap::new();
        headers.insert("x-audit-token".to_string(), "secret-{{lead.id}}".to_string());
        StepAction::WebhookCall(WebhookCallConfig {
            url,
            method: method.into(),
            headers,
            body,
        })
    }

    #[tokio::test]
    async fn test_webhook_call_sends_rendered_request() {
        let (base, server) = serve_once(200, r#"{"ok":true}"#).await;
        let runner = StepRunner::new(Arc::new(DownProvider), Arc::new(LogSender::new()), GenerateParams::default());
        let action = webhook(
            format!("{base}/crm/{{{{lead.id}}}}"),
            "put",
            Some(json!({"company": "{{lead.businessName}}", "score": 82})),
        );
        let input = json!({"lead": {"id": "L1", "businessName": "Cafe Luna"}});

        let out = runner.run(&action, &input).await.unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["status"], 200);
        assert_eq!(out["response"], json!({"ok": true}));

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /crm/L1 HTTP/1.1"));
        // header values are sent verbatim, not templated
        assert!(request.to_lowercase().contains("x-audit-token: secret-{{lead.id}}"));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let sent: Value = serde_json::from_str(body).unwrap();
        assert_eq!(sent, json!({"company": "Cafe Luna", "score": 82}));
    }

    #[tokio::test]
    async fn test_webhook_non_2xx_is_unsuccessful_output() {
        let (base, server) = serve_once(500, r#"{"error":"boom"}"#).await;
        let runner = StepRunner::new(Arc::new(DownProvider), Arc::new(LogSender::new()), GenerateParams::default());
        let input = json!({"lead": {"id": "L2"}});

        let out = runner.run(&webhook(base, "POST", None), &input).await.unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["status"], 500);
        assert_eq!(out["response"]["error"], "boom");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST / HTTP/1.1"));
        // no body template: the step input is posted
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        assert_eq!(serde_json::from_str::<Value>(body).unwrap(), input);
    }
}
