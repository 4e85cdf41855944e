use std::io;

use overdue_client::contracts::envelope::failure_from_error;
use overdue_client::{ClientError, SuccessEnvelope};
use serde::Serialize;

pub fn render_success_json(success: &SuccessEnvelope) -> io::Result<String> {
    serialize_json_pretty(success)
}

pub fn render_error_json(command: Option<&str>, error: &ClientError) -> io::Result<String> {
    serialize_json_pretty(&failure_from_error(command, error))
}

fn serialize_json_pretty<T>(value: &T) -> io::Result<String>
where
    T: Serialize + ?Sized,
{
    serde_json::to_string_pretty(value).map_err(|error| io::Error::other(error.to_string()))
}

#[cfg(test)]
mod tests {
    use overdue_client::ClientError;
    use overdue_client::contracts::envelope::success;
    use serde_json::{Value, json};

    use super::{render_error_json, render_success_json};

    fn parse(rendered: std::io::Result<String>) -> Value {
        assert!(rendered.is_ok());
        rendered
            .ok()
            .and_then(|text| serde_json::from_str::<Value>(&text).ok())
            .unwrap_or(Value::Null)
    }

    #[test]
    fn success_json_is_the_full_envelope() {
        let envelope = success("service check", json!({ "allowed": true }));
        assert!(envelope.is_ok());
        if let Ok(envelope) = envelope {
            let value = parse(render_success_json(
                &envelope.with_warning("heads up".to_string()),
            ));
            assert_eq!(value["ok"], true);
            assert_eq!(value["command"], "service check");
            assert_eq!(value["data"]["allowed"], true);
            assert_eq!(value["warnings"][0], "heads up");
        }
    }

    #[test]
    fn error_json_includes_command_and_recovery_steps() {
        let error = ClientError::invoice_not_found("inv_1");
        let value = parse(render_error_json(Some("escalate"), &error));
        assert_eq!(value["ok"], false);
        assert_eq!(value["command"], "escalate");
        assert_eq!(value["error"]["code"], "invoice_not_found");
        assert!(value["error"]["recovery_steps"].is_array());

        let unparsed = parse(render_error_json(None, &error));
        assert!(unparsed["command"].is_null());
    }
}
