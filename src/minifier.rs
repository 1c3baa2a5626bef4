//! Deterministic `Message -> canonical wire text`.
//!
//! Mirrors `minifier.py`'s per-statement-kind minify functions, extended
//! with the three kinds the original never had a wire encoder for
//! (Subscribe/Unsubscribe/Knowledge) per the grammar in `parser.rs`.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::model::{Header, Message, Statement, Value};

/// Render a message to its canonical minified wire string.
pub fn to_minified_string(message: &Message) -> String {
    let mut out = minify_header(&message.header);
    out.push('\n');
    let bodies: Vec<String> = message.statements.iter().map(minify_statement).collect();
    out.push_str(&bodies.join(";"));
    out
}

fn minify_header(header: &Header) -> String {
    let mut out = format!(
        "H v {} id={} src={} dst={} ts={}",
        header.version, header.message_id, header.source, header.destination, header.timestamp
    );
    if let Some(corr) = &header.correlation {
        let _ = write!(out, " corr={corr}");
    }
    if let Some(ttl) = header.ttl {
        let _ = write!(out, " ttl={ttl}");
    }
    out
}

fn minify_statement(statement: &Statement) -> String {
    match statement {
        Statement::Action(a) => minify_action(a),
        Statement::Query(q) => minify_query(q),
        Statement::Assert(a) => minify_assert(a),
        Statement::Control(c) => minify_control(c),
        Statement::Event(e) => minify_event(e),
        Statement::Error(e) => minify_error(e),
        Statement::Fold(f) => minify_fold(f),
        Statement::Recall(r) => format!("RECALL {}", r.fold_id),
        Statement::Subscribe(s) => minify_subscribe(s),
        Statement::Unsubscribe(u) => format!("UNSUB {}", u.topic),
        Statement::Knowledge(k) => minify_knowledge(k),
    }
}

fn minify_action(a: &crate::model::ActionStatement) -> String {
    let mut out = format!("DO {}({})", a.verb, minify_args(&a.args, &a.named_args));
    if let Some(policy) = &a.policy {
        let _ = write!(out, " P:{policy}");
        if let Some(expr) = &a.policy_expr {
            let _ = write!(out, ":{expr}");
        }
    }
    if let Some(priority) = a.priority {
        let _ = write!(out, " PRIO={}", priority.as_str());
    }
    if let Some(reason) = &a.reason {
        if crate::expression::is_expression(reason) {
            let _ = write!(out, " BECAUSE {reason}");
        } else {
            let _ = write!(out, " BECAUSE {}", minify_string(reason));
        }
    }
    out
}

fn minify_query(q: &crate::model::QueryStatement) -> String {
    let mut out = format!("Q {}", q.expression);
    if let Some(constraint) = &q.constraint {
        let _ = write!(out, " WHERE {constraint}");
    }
    out
}

fn minify_assert(a: &crate::model::AssertStatement) -> String {
    format!("A {}={}", a.path, minify_value(&a.value))
}

fn minify_control(c: &crate::model::ControlStatement) -> String {
    let mut out = format!(
        "IF {} THEN {}",
        c.condition,
        minify_statement(&c.then_statement)
    );
    if let Some(else_stmt) = &c.else_statement {
        let _ = write!(out, " ELSE {}", minify_statement(else_stmt));
    }
    out
}

fn minify_event(e: &crate::model::EventStatement) -> String {
    format!(
        "EVT {}({})",
        e.event_name,
        minify_args(&e.args, &e.named_args)
    )
}

fn minify_error(e: &crate::model::ErrorStatement) -> String {
    let mut out = format!("ERR {}", e.error_code);
    if let Some(message) = &e.message {
        let _ = write!(out, " {}", minify_string(message));
    }
    out
}

fn minify_fold(f: &crate::model::FoldStatement) -> String {
    let mut out = format!("FOLD {} {}", f.fold_id, minify_string(&f.summary));
    if let Some(state) = &f.state {
        let _ = write!(out, " STATE {}", minify_value(&Value::Object(state.clone())));
    }
    out
}

fn minify_subscribe(s: &crate::model::SubscribeStatement) -> String {
    let mut out = format!("SUB {}", s.topic);
    if let Some(filter) = &s.filter_expr {
        let _ = write!(out, " WHERE {filter}");
    }
    out
}

fn minify_knowledge(k: &crate::model::KnowledgeStatement) -> String {
    format!("KNOW {} {} v {}", k.topic, minify_value(&k.value), k.version)
}

fn minify_args(args: &[Value], named_args: &IndexMap<String, Value>) -> String {
    let mut parts: Vec<String> = args.iter().map(minify_value).collect();
    for (name, value) in named_args {
        parts.push(format!("{name}={}", minify_value(value)));
    }
    parts.join(",")
}

fn minify_value(value: &Value) -> String {
    match value {
        Value::String(s) => minify_string(s),
        Value::Path(p) => p.clone(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(minify_value).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", minify_string(k), minify_value(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

/// Platform "shortest round-trip" float rendering: Rust's `Display` for
/// `f64` already produces the shortest string that parses back to the same
/// value, except it omits a trailing `.0` for integral floats, which would
/// make `2.0` indistinguishable from an `Int` on re-parse.
fn format_float(f: f64) -> String {
    let s = f.to_string();
    if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
        s
    } else {
        format!("{s}.0")
    }
}

fn minify_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Character/token/percent-saved comparison against an equivalent JSON
/// rendering of the same message, matching `minifier.py`'s
/// `compare_with_json`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JsonComparison {
    pub minified_chars: usize,
    pub json_chars: usize,
    pub minified_tokens: usize,
    pub json_tokens: usize,
    pub percent_saved: f64,
}

fn approx_tokens(s: &str) -> usize {
    (s.len() + 3) / 4
}

impl Message {
    /// Compare the minified wire size against an equivalent JSON encoding.
    pub fn compare_with_json(&self) -> JsonComparison {
        let minified = to_minified_string(self);
        let json = to_json_equivalent(self);
        let minified_chars = minified.chars().count();
        let json_chars = json.chars().count();
        let minified_tokens = approx_tokens(&minified);
        let json_tokens = approx_tokens(&json);
        let percent_saved = if json_chars == 0 {
            0.0
        } else {
            100.0 * (1.0 - (minified_chars as f64 / json_chars as f64))
        };
        JsonComparison {
            minified_chars,
            json_chars,
            minified_tokens,
            json_tokens,
            percent_saved,
        }
    }
}

fn to_json_equivalent(message: &Message) -> String {
    let mut header = serde_json::Map::new();
    header.insert("v".into(), message.header.version.into());
    header.insert("id".into(), message.header.message_id.clone().into());
    header.insert("src".into(), message.header.source.clone().into());
    header.insert("dst".into(), message.header.destination.clone().into());
    header.insert("ts".into(), message.header.timestamp.into());
    if let Some(corr) = &message.header.correlation {
        header.insert("corr".into(), corr.clone().into());
    }
    if let Some(ttl) = message.header.ttl {
        header.insert("ttl".into(), ttl.into());
    }
    let statements: Vec<serde_json::Value> = message
        .statements
        .iter()
        .map(statement_to_json)
        .collect();
    let root = serde_json::json!({
        "header": header,
        "statements": statements,
    });
    serde_json::to_string(&root).unwrap_or_default()
}

fn statement_to_json(statement: &Statement) -> serde_json::Value {
    match statement {
        Statement::Action(a) => serde_json::json!({
            "type": "DO", "verb": a.verb,
            "args": a.args.iter().map(Value::to_json).collect::<Vec<_>>(),
            "namedArgs": a.named_args.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>(),
        }),
        Statement::Query(q) => serde_json::json!({ "type": "Q", "expression": q.expression, "constraint": q.constraint }),
        Statement::Assert(a) => serde_json::json!({ "type": "A", "path": a.path, "value": a.value.to_json() }),
        Statement::Control(c) => serde_json::json!({
            "type": "IF", "condition": c.condition,
            "then": statement_to_json(&c.then_statement),
            "else": c.else_statement.as_ref().map(|s| statement_to_json(s)),
        }),
        Statement::Event(e) => serde_json::json!({
            "type": "EVT", "eventName": e.event_name,
            "args": e.args.iter().map(Value::to_json).collect::<Vec<_>>(),
            "namedArgs": e.named_args.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>(),
        }),
        Statement::Error(e) => serde_json::json!({ "type": "ERR", "errorCode": e.error_code, "message": e.message }),
        Statement::Fold(f) => serde_json::json!({
            "type": "FOLD", "foldId": f.fold_id, "summary": f.summary,
            "state": f.state.as_ref().map(|s| s.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>()),
        }),
        Statement::Recall(r) => serde_json::json!({ "type": "RECALL", "foldId": r.fold_id }),
        Statement::Subscribe(s) => serde_json::json!({ "type": "SUB", "topic": s.topic, "filterExpr": s.filter_expr }),
        Statement::Unsubscribe(u) => serde_json::json!({ "type": "UNSUB", "topic": u.topic }),
        Statement::Knowledge(k) => serde_json::json!({ "type": "KNOW", "topic": k.topic, "value": k.value.to_json(), "version": k.version }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_message;

    #[test]
    fn scenario_1_parse_minify_canonical_action() {
        let input = "H v 1 id=msg1 src=svc1 dst=svc2 ts=1234567890\nDO deploy(\"app1\", version=2)";
        let message = parse_message(input).unwrap();
        let minified = to_minified_string(&message);
        assert_eq!(
            minified,
            "H v 1 id=msg1 src=svc1 dst=svc2 ts=1234567890\nDO deploy(\"app1\",version=2)"
        );
    }

    #[test]
    fn round_trip_is_idempotent() {
        let valid = "H v 1 id=m1 src=a dst=b ts=1\nA x.y=5";
        let first = parse_message(valid).unwrap();
        let minified_once = to_minified_string(&first);
        let second = parse_message(&minified_once).unwrap();
        let minified_twice = to_minified_string(&second);
        assert_eq!(minified_once, minified_twice);
        assert_eq!(first, second);
    }
}
