/// 構造化JSON形式ログ。
use serde_json::{Map, Value, json};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// ログ集約側での絞り込みに使うため、トップレベルへ持ち上げるフィールド。
const LIFTED_FIELDS: [&str; 2] = ["mode", "category"];

/// 重要イベントの構造化ログレイヤー。
pub(crate) struct StructuredLogLayer;

impl<S: Subscriber> Layer<S> for StructuredLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        // 重要イベントのみJSON形式で出力
        if level > Level::INFO {
            return;
        }

        let mut visitor = JsonVisitor { values: Map::new() };
        event.record(&mut visitor);

        let entry = render_entry(
            level,
            event.metadata().target(),
            event.metadata().name(),
            visitor.values,
        );
        eprintln!("{}", serde_json::to_string(&entry).unwrap_or_default());
    }
}

/// 1イベント分のJSONを組み立てる。`message` が無い場合はイベント名で代用する。
fn render_entry(level: Level, target: &str, name: &str, mut fields: Map<String, Value>) -> Value {
    let message = fields.remove("message").unwrap_or_else(|| json!(name));

    let mut entry = Map::new();
    entry.insert(
        "timestamp".to_string(),
        json!(chrono::Utc::now().to_rfc3339()),
    );
    entry.insert("level".to_string(), json!(level.as_str()));
    entry.insert("service".to_string(), json!(env!("CARGO_PKG_NAME")));
    entry.insert("target".to_string(), json!(target));
    entry.insert("message".to_string(), message);
    for key in LIFTED_FIELDS {
        if let Some(value) = fields.remove(key) {
            entry.insert(key.to_string(), value);
        }
    }
    entry.insert("fields".to_string(), Value::Object(fields));

    Value::Object(entry)
}

struct JsonVisitor {
    values: Map<String, Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.values
            .insert(field.name().to_string(), json!(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.values.insert(field.name().to_string(), json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.values.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.values.insert(field.name().to_string(), json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.values.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.values.insert(field.name().to_string(), json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lifts_run_keys_and_message() {
        let mut fields = Map::new();
        fields.insert("message".to_string(), json!("category clustered"));
        fields.insert("category".to_string(), json!("CurbRamp"));
        fields.insert("cluster_count".to_string(), json!(4));

        let entry = render_entry(Level::WARN, "label_consensus::pipeline", "event", fields);

        assert_eq!(entry["level"], "WARN");
        assert_eq!(entry["service"], "label-consensus");
        assert_eq!(entry["message"], "category clustered");
        assert_eq!(entry["category"], "CurbRamp");
        assert_eq!(entry["fields"]["cluster_count"], 4);
        assert!(entry["fields"].get("category").is_none());
        assert!(entry.get("mode").is_none());
    }

    #[test]
    fn render_falls_back_to_event_name() {
        let entry = render_entry(Level::INFO, "t", "event src/main.rs:10", Map::new());

        assert_eq!(entry["message"], "event src/main.rs:10");
    }
}
