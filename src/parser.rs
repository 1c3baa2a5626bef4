//! Grammar-driven text → [`crate::model::Message`].
//!
//! Header tokens are whitespace-separated `key=value` pairs after
//! `H v <int>`; the body is a semicolon-separated statement list with an
//! optional trailing semicolon. Expression text for Query/Control/SUB/
//! Action-reason clauses is retained verbatim (sliced straight out of the
//! source) rather than parsed into an AST here — `expression.rs` re-lexes
//! it lazily when someone actually evaluates it.

use indexmap::IndexMap;

use crate::error::Error;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::model::{
    ActionStatement, AssertStatement, ControlStatement, ErrorStatement, EventStatement,
    FoldStatement, Header, KnowledgeStatement, Message, Priority, QueryStatement,
    RecallStatement, Statement, SubscribeStatement, UnsubscribeStatement, Value,
};

/// Parse a full SAG message: header line, newline, statement body.
pub fn parse_message(src: &str) -> Result<Message, Error> {
    let (header_line, body) = split_header(src)?;
    let header = parse_header(header_line)?;
    let tokens = Lexer::new(body)
        .tokenize()
        .map_err(|e| Error::parse(e.line, e.column, e.message))?;
    let mut parser = Parser {
        src: body,
        tokens,
        pos: 0,
    };
    let statements = parser.parse_statements()?;
    Ok(Message::new(header, statements))
}

fn split_header(src: &str) -> Result<(&str, &str), Error> {
    match src.find('\n') {
        Some(idx) => Ok((&src[..idx], &src[idx + 1..])),
        None => Ok((src, "")),
    }
}

fn parse_header(line: &str) -> Result<Header, Error> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("H") {
        return Err(Error::parse(1, 1, "header must start with 'H'"));
    }
    if parts.next() != Some("v") {
        return Err(Error::parse(1, 1, "expected 'v' after 'H'"));
    }
    let version: i32 = parts
        .next()
        .ok_or_else(|| Error::parse(1, 1, "missing header version"))?
        .parse()
        .map_err(|_| Error::parse(1, 1, "header version must be an integer"))?;

    let mut id = None;
    let mut src = None;
    let mut dst = None;
    let mut ts = None;
    let mut corr = None;
    let mut ttl = None;

    for part in parts {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| Error::parse(1, 1, format!("malformed header field '{part}'")))?;
        match key {
            "id" => id = Some(value.to_string()),
            "src" => src = Some(value.to_string()),
            "dst" => dst = Some(value.to_string()),
            "ts" => {
                ts = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| Error::parse(1, 1, "ts must be an integer"))?,
                )
            }
            "corr" => {
                if value != "-" {
                    corr = Some(value.to_string());
                }
            }
            "ttl" => {
                ttl = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| Error::parse(1, 1, "ttl must be an integer"))?,
                )
            }
            other => return Err(Error::parse(1, 1, format!("unknown header field '{other}'"))),
        }
    }

    let mut header = Header::new(
        version,
        id.ok_or_else(|| Error::parse(1, 1, "missing header 'id'"))?,
        src.ok_or_else(|| Error::parse(1, 1, "missing header 'src'"))?,
        dst.ok_or_else(|| Error::parse(1, 1, "missing header 'dst'"))?,
        ts.ok_or_else(|| Error::parse(1, 1, "missing header 'ts'"))?,
    );
    if let Some(c) = corr {
        header = header.with_correlation(c);
    }
    if let Some(t) = ttl {
        header = header.with_ttl(t);
    }
    Ok(header)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> Error {
        let tok = self.peek();
        Error::parse(tok.line, tok.column, message.into())
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == name)
    }

    fn expect_ident(&mut self, name: &str) -> Result<(), Error> {
        if self.is_ident(name) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{name}'")))
        }
    }

    fn expect_symbol(&mut self, c: char) -> Result<(), Error> {
        if matches!(self.peek().kind, TokenKind::Symbol(s) if s == c) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected '{c}'")))
        }
    }

    fn is_symbol(&self, c: char) -> bool {
        matches!(self.peek().kind, TokenKind::Symbol(s) if s == c)
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn expect_string(&mut self) -> Result<String, Error> {
        match self.advance().kind {
            TokenKind::Str(s) => Ok(s),
            _ => Err(self.err("expected a string literal")),
        }
    }

    fn expect_ident_value(&mut self) -> Result<String, Error> {
        match self.advance().kind {
            TokenKind::Ident(s) => Ok(s),
            _ => Err(self.err("expected an identifier")),
        }
    }

    fn expect_int(&mut self) -> Result<i64, Error> {
        match self.advance().kind {
            TokenKind::Int(i) => Ok(i),
            _ => Err(self.err("expected an integer literal")),
        }
    }

    fn parse_statements(&mut self) -> Result<Vec<Statement>, Error> {
        let mut statements = Vec::new();
        while !self.is_eof() {
            if self.is_symbol(';') {
                self.advance();
                continue;
            }
            statements.push(self.parse_statement()?);
            if self.is_symbol(';') {
                self.advance();
            } else if !self.is_eof() {
                return Err(self.err("expected ';' between statements"));
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, Error> {
        let keyword = match &self.peek().kind {
            TokenKind::Ident(s) => s.clone(),
            _ => return Err(self.err("expected a statement keyword")),
        };
        match keyword.as_str() {
            "DO" => self.parse_action(),
            "Q" => self.parse_query(),
            "A" => self.parse_assert(),
            "IF" => self.parse_control(),
            "EVT" => self.parse_event(),
            "ERR" => self.parse_error_stmt(),
            "FOLD" => self.parse_fold(),
            "RECALL" => self.parse_recall(),
            "SUB" => self.parse_subscribe(),
            "UNSUB" => self.parse_unsubscribe(),
            "KNOW" => self.parse_knowledge(),
            other => Err(self.err(format!("unknown statement keyword '{other}'"))),
        }
    }

    fn parse_action(&mut self) -> Result<Statement, Error> {
        self.expect_ident("DO")?;
        let verb = self.expect_ident_value()?;
        self.expect_symbol('(')?;
        let (args, named_args) = self.parse_arg_list()?;
        self.expect_symbol(')')?;

        let mut stmt = ActionStatement {
            verb,
            args,
            named_args,
            policy: None,
            policy_expr: None,
            priority: None,
            reason: None,
        };

        loop {
            if self.is_ident("P") && self.peek_is_colon_after_ident() {
                self.advance(); // P
                self.expect_symbol(':')?;
                stmt.policy = Some(self.expect_ident_value()?);
                if self.is_symbol(':') {
                    self.advance();
                    let (text, _) = self.scan_expr_span(&["P", "PRIO", "BECAUSE", ";"])?;
                    stmt.policy_expr = Some(text);
                }
            } else if self.is_ident("PRIO") {
                self.advance();
                self.expect_symbol('=')?;
                let level = self.expect_ident_value()?;
                stmt.priority = Some(
                    Priority::parse(&level)
                        .ok_or_else(|| self.err(format!("unknown priority '{level}'")))?,
                );
            } else if self.is_ident("BECAUSE") {
                self.advance();
                if matches!(self.peek().kind, TokenKind::Str(_)) {
                    stmt.reason = Some(self.expect_string()?);
                } else {
                    let (text, _) = self.scan_expr_span(&["P", "PRIO", "BECAUSE", ";"])?;
                    stmt.reason = Some(text);
                }
            } else {
                break;
            }
        }

        Ok(Statement::Action(stmt))
    }

    /// Distinguish the clause keyword `P:` from a bare identifier argument
    /// that happens to be named `P` — only relevant at the top level of the
    /// action's trailing-clause loop, where the next token must be `:`.
    fn peek_is_colon_after_ident(&self) -> bool {
        matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Symbol(':')))
    }

    fn parse_arg_list(&mut self) -> Result<(Vec<Value>, IndexMap<String, Value>), Error> {
        let mut args = Vec::new();
        let mut named = IndexMap::new();
        if self.is_symbol(')') {
            return Ok((args, named));
        }
        loop {
            if self.is_named_arg_start() {
                let name = self.expect_ident_value()?;
                self.expect_symbol('=')?;
                let value = self.parse_value()?;
                named.insert(name, value);
            } else {
                let value = self.parse_value()?;
                args.push(value);
            }
            if self.is_symbol(',') {
                self.advance();
                continue;
            }
            break;
        }
        Ok((args, named))
    }

    fn is_named_arg_start(&self) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(_))
            && matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Symbol('=')))
    }

    fn parse_value(&mut self) -> Result<Value, Error> {
        match &self.peek().kind {
            TokenKind::Str(_) => Ok(Value::String(self.expect_string()?)),
            TokenKind::Int(i) => {
                let i = *i;
                self.advance();
                Ok(Value::Int(i))
            }
            TokenKind::Float(f) => {
                let f = *f;
                self.advance();
                Ok(Value::Float(f))
            }
            TokenKind::Bool(b) => {
                let b = *b;
                self.advance();
                Ok(Value::Bool(b))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Value::Null)
            }
            TokenKind::Symbol('[') => self.parse_list(),
            TokenKind::Symbol('{') => self.parse_object(),
            TokenKind::Ident(s) => {
                let s = s.clone();
                self.advance();
                Ok(Value::Path(s))
            }
            _ => Err(self.err("expected a value")),
        }
    }

    fn parse_list(&mut self) -> Result<Value, Error> {
        self.expect_symbol('[')?;
        let mut items = Vec::new();
        if !self.is_symbol(']') {
            loop {
                items.push(self.parse_value()?);
                if self.is_symbol(',') {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_symbol(']')?;
        Ok(Value::List(items))
    }

    fn parse_object(&mut self) -> Result<Value, Error> {
        self.expect_symbol('{')?;
        let mut map = IndexMap::new();
        if !self.is_symbol('}') {
            loop {
                let key = match self.advance().kind {
                    TokenKind::Str(s) => s,
                    TokenKind::Ident(s) => s,
                    _ => return Err(self.err("expected an object key")),
                };
                self.expect_symbol(':')?;
                let value = self.parse_value()?;
                map.insert(key, value);
                if self.is_symbol(',') {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect_symbol('}')?;
        Ok(Value::Object(map))
    }

    fn parse_query(&mut self) -> Result<Statement, Error> {
        self.expect_ident("Q")?;
        let (expression, _) = self.scan_expr_span(&["WHERE", ";"])?;
        let constraint = if self.is_ident("WHERE") {
            self.advance();
            let (text, _) = self.scan_expr_span(&[";"])?;
            Some(text)
        } else {
            None
        };
        Ok(Statement::Query(QueryStatement {
            expression,
            constraint,
        }))
    }

    fn parse_assert(&mut self) -> Result<Statement, Error> {
        self.expect_ident("A")?;
        let path = self.parse_path()?;
        self.expect_symbol('=')?;
        let value = self.parse_value()?;
        Ok(Statement::Assert(AssertStatement { path, value }))
    }

    fn parse_path(&mut self) -> Result<String, Error> {
        match self.advance().kind {
            TokenKind::Ident(s) => Ok(s),
            TokenKind::Str(s) => Ok(s),
            _ => Err(self.err("expected a dotted path")),
        }
    }

    fn parse_control(&mut self) -> Result<Statement, Error> {
        self.expect_ident("IF")?;
        let (condition, _) = self.scan_expr_span(&["THEN"])?;
        self.expect_ident("THEN")?;
        let then_statement = Box::new(self.parse_statement()?);
        let else_statement = if self.is_ident("ELSE") {
            self.advance();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Statement::Control(ControlStatement {
            condition,
            then_statement,
            else_statement,
        }))
    }

    fn parse_event(&mut self) -> Result<Statement, Error> {
        self.expect_ident("EVT")?;
        let event_name = self.expect_ident_value()?;
        self.expect_symbol('(')?;
        let (args, named_args) = self.parse_arg_list()?;
        self.expect_symbol(')')?;
        Ok(Statement::Event(EventStatement {
            event_name,
            args,
            named_args,
        }))
    }

    fn parse_error_stmt(&mut self) -> Result<Statement, Error> {
        self.expect_ident("ERR")?;
        let error_code = self.expect_ident_value()?;
        let message = if matches!(self.peek().kind, TokenKind::Str(_)) {
            Some(self.expect_string()?)
        } else {
            None
        };
        Ok(Statement::Error(ErrorStatement {
            error_code,
            message,
        }))
    }

    fn parse_fold(&mut self) -> Result<Statement, Error> {
        self.expect_ident("FOLD")?;
        let fold_id = self.expect_ident_value()?;
        let summary = self.expect_string()?;
        let state = if self.is_ident("STATE") {
            self.advance();
            match self.parse_object()? {
                Value::Object(map) => Some(map),
                _ => unreachable!(),
            }
        } else {
            None
        };
        Ok(Statement::Fold(FoldStatement {
            fold_id,
            summary,
            state,
        }))
    }

    fn parse_recall(&mut self) -> Result<Statement, Error> {
        self.expect_ident("RECALL")?;
        let fold_id = self.expect_ident_value()?;
        Ok(Statement::Recall(RecallStatement { fold_id }))
    }

    fn parse_subscribe(&mut self) -> Result<Statement, Error> {
        self.expect_ident("SUB")?;
        let topic = self.parse_topic()?;
        let filter_expr = if self.is_ident("WHERE") {
            self.advance();
            let (text, _) = self.scan_expr_span(&[";"])?;
            Some(text)
        } else {
            None
        };
        Ok(Statement::Subscribe(SubscribeStatement {
            topic,
            filter_expr,
        }))
    }

    fn parse_unsubscribe(&mut self) -> Result<Statement, Error> {
        self.expect_ident("UNSUB")?;
        let topic = self.parse_topic()?;
        Ok(Statement::Unsubscribe(UnsubscribeStatement { topic }))
    }

    /// Topics may contain a bare `**` (lexed as two `*` symbols, since `*` is
    /// a multiplicative operator elsewhere) or dotted segments with `*`/`**`
    /// wildcard segments — accepted here as raw identifier-ish text.
    fn parse_topic(&mut self) -> Result<String, Error> {
        let start = self.peek().start;
        loop {
            match &self.peek().kind {
                TokenKind::Ident(_) => {
                    self.advance();
                }
                TokenKind::Op("*") => {
                    self.advance();
                }
                TokenKind::Symbol('.') => {
                    self.advance();
                }
                _ => break,
            }
        }
        let end = self.tokens[self.pos.saturating_sub(1)].end.max(start);
        if end <= start {
            return Err(self.err("expected a topic"));
        }
        Ok(self.src[start..end].to_string())
    }

    fn parse_knowledge(&mut self) -> Result<Statement, Error> {
        self.expect_ident("KNOW")?;
        let topic = self.parse_topic()?;
        let value = self.parse_value()?;
        self.expect_ident("v")?;
        let version = self.expect_int()?;
        Ok(Statement::Knowledge(KnowledgeStatement {
            topic,
            value,
            version,
        }))
    }

    /// Scan forward, tracking paren/bracket/brace nesting, until hitting an
    /// un-nested occurrence of one of `stop_words` (an ident keyword or `;`)
    /// or EOF. Returns the raw source slice spanned and advances `self.pos`
    /// to just before the stop token. This is what lets an Action's `P:`/
    /// `PRIO=`/`BECAUSE` clauses — and a Query's `WHERE` — appear in any
    /// order while keeping expression text unparsed until evaluation time.
    fn scan_expr_span(&mut self, stop_words: &[&str]) -> Result<(String, usize), Error> {
        let start_idx = self.pos;
        if self.is_eof() || (self.is_symbol(';') && stop_words.contains(&";")) {
            return Err(self.err("expected an expression"));
        }
        let start = self.peek().start;
        let mut depth: i32 = 0;
        loop {
            if self.is_eof() {
                break;
            }
            if depth == 0 {
                if let TokenKind::Ident(s) = &self.peek().kind {
                    if stop_words.contains(&s.as_str()) {
                        break;
                    }
                }
                if self.is_symbol(';') && stop_words.contains(&";") {
                    break;
                }
            }
            match &self.peek().kind {
                TokenKind::Symbol('(') | TokenKind::Symbol('[') | TokenKind::Symbol('{') => {
                    depth += 1
                }
                TokenKind::Symbol(')') | TokenKind::Symbol(']') | TokenKind::Symbol('}') => {
                    depth -= 1
                }
                _ => {}
            }
            self.advance();
        }
        let end = self.tokens[self.pos.saturating_sub(1)].end.max(start);
        if self.pos == start_idx {
            return Err(self.err("expected an expression"));
        }
        Ok((self.src[start..end].trim().to_string(), end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_line() -> &'static str {
        "H v 1 id=m1 src=svc1 dst=svc2 ts=1700000000"
    }

    fn parse_body(body: &str) -> Message {
        parse_message(&format!("{}\n{body}", header_line())).unwrap()
    }

    #[test]
    fn header_with_correlation_and_ttl() {
        let msg = parse_message(
            "H v 1 id=m1 src=a dst=b ts=5 corr=c1 ttl=60\nA x=1",
        )
        .unwrap();
        assert_eq!(msg.header.correlation, Some("c1".to_string()));
        assert_eq!(msg.header.ttl, Some(60));
    }

    #[test]
    fn header_corr_dash_means_absent() {
        let msg = parse_message("H v 1 id=m1 src=a dst=b ts=5 corr=-\nA x=1").unwrap();
        assert_eq!(msg.header.correlation, None);
    }

    #[test]
    fn header_missing_field_errors() {
        assert!(parse_message("H v 1 id=m1 src=a ts=5\nA x=1").is_err());
    }

    #[test]
    fn header_unknown_field_errors() {
        assert!(parse_message("H v 1 id=m1 src=a dst=b ts=5 bogus=1\nA x=1").is_err());
    }

    #[test]
    fn header_wrong_start_errors() {
        assert!(parse_message("X v 1 id=m1 src=a dst=b ts=5\nA x=1").is_err());
    }

    #[test]
    fn action_with_positional_and_named_args() {
        let msg = parse_body(r#"DO deploy("app1", version=2, force=true)"#);
        match &msg.statements()[0] {
            Statement::Action(a) => {
                assert_eq!(a.verb, "deploy");
                assert_eq!(a.args, vec![Value::String("app1".to_string())]);
                assert_eq!(a.named_args.get("version"), Some(&Value::Int(2)));
                assert_eq!(a.named_args.get("force"), Some(&Value::Bool(true)));
            }
            other => panic!("expected Action, got {other:?}"),
        }
    }

    #[test]
    fn action_with_policy_priority_and_because_clauses_in_any_order() {
        let msg = parse_body(r#"DO deploy() PRIO=HIGH BECAUSE "rollout" P:strict"#);
        match &msg.statements()[0] {
            Statement::Action(a) => {
                assert_eq!(a.priority, Some(Priority::High));
                assert_eq!(a.reason, Some("rollout".to_string()));
                assert_eq!(a.policy, Some("strict".to_string()));
            }
            other => panic!("expected Action, got {other:?}"),
        }
    }

    #[test]
    fn action_because_with_bare_expression_is_kept_verbatim() {
        let msg = parse_body("DO deploy() BECAUSE x.ready == true");
        match &msg.statements()[0] {
            Statement::Action(a) => assert_eq!(a.reason.as_deref(), Some("x.ready == true")),
            other => panic!("expected Action, got {other:?}"),
        }
    }

    #[test]
    fn action_unknown_priority_errors() {
        let src = format!("{}\nDO deploy() PRIO=URGENT", header_line());
        assert!(parse_message(&src).is_err());
    }

    #[test]
    fn query_with_where_clause() {
        let msg = parse_body("Q x.cpu > 50 WHERE x.region == \"us\"");
        match &msg.statements()[0] {
            Statement::Query(q) => {
                assert_eq!(q.expression, "x.cpu > 50");
                assert_eq!(q.constraint.as_deref(), Some("x.region == \"us\""));
            }
            other => panic!("expected Query, got {other:?}"),
        }
    }

    #[test]
    fn assert_statement() {
        let msg = parse_body("A system.cpu=85");
        match &msg.statements()[0] {
            Statement::Assert(a) => {
                assert_eq!(a.path, "system.cpu");
                assert_eq!(a.value, Value::Int(85));
            }
            other => panic!("expected Assert, got {other:?}"),
        }
    }

    #[test]
    fn control_with_else_branch() {
        let msg = parse_body(r#"IF x.ok THEN DO deploy() ELSE ERR fail "nope""#);
        match &msg.statements()[0] {
            Statement::Control(c) => {
                assert_eq!(c.condition, "x.ok");
                assert!(matches!(*c.then_statement, Statement::Action(_)));
                assert!(matches!(
                    c.else_statement.as_deref(),
                    Some(Statement::Error(_))
                ));
            }
            other => panic!("expected Control, got {other:?}"),
        }
    }

    #[test]
    fn event_statement() {
        let msg = parse_body(r#"EVT deployment_started(region="us")"#);
        match &msg.statements()[0] {
            Statement::Event(e) => {
                assert_eq!(e.event_name, "deployment_started");
                assert_eq!(e.named_args.get("region"), Some(&Value::String("us".to_string())));
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn error_statement_without_message() {
        let msg = parse_body("ERR timeout");
        match &msg.statements()[0] {
            Statement::Error(e) => {
                assert_eq!(e.error_code, "timeout");
                assert_eq!(e.message, None);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn fold_statement_with_state() {
        let msg = parse_body(r#"FOLD f1 "summary text" STATE {a:1,b:"x"}"#);
        match &msg.statements()[0] {
            Statement::Fold(f) => {
                assert_eq!(f.fold_id, "f1");
                assert_eq!(f.summary, "summary text");
                let state = f.state.as_ref().unwrap();
                assert_eq!(state.get("a"), Some(&Value::Int(1)));
                assert_eq!(state.get("b"), Some(&Value::String("x".to_string())));
            }
            other => panic!("expected Fold, got {other:?}"),
        }
    }

    #[test]
    fn recall_statement() {
        let msg = parse_body("RECALL f1");
        assert!(matches!(&msg.statements()[0], Statement::Recall(r) if r.fold_id == "f1"));
    }

    #[test]
    fn subscribe_and_unsubscribe_with_wildcards() {
        let msg = parse_body("SUB system.**; UNSUB system.*.cpu");
        match &msg.statements()[0] {
            Statement::Subscribe(s) => assert_eq!(s.topic, "system.**"),
            other => panic!("expected Subscribe, got {other:?}"),
        }
        match &msg.statements()[1] {
            Statement::Unsubscribe(u) => assert_eq!(u.topic, "system.*.cpu"),
            other => panic!("expected Unsubscribe, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_with_where_filter() {
        let msg = parse_body(r#"SUB system.* WHERE x.value > 10"#);
        match &msg.statements()[0] {
            Statement::Subscribe(s) => assert_eq!(s.filter_expr.as_deref(), Some("x.value > 10")),
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn knowledge_statement() {
        let msg = parse_body(r#"KNOW system.cpu 85 v 3"#);
        match &msg.statements()[0] {
            Statement::Knowledge(k) => {
                assert_eq!(k.topic, "system.cpu");
                assert_eq!(k.value, Value::Int(85));
                assert_eq!(k.version, 3);
            }
            other => panic!("expected Knowledge, got {other:?}"),
        }
    }

    #[test]
    fn list_and_object_values() {
        let msg = parse_body(r#"A x=[1,"a",true,null]"#);
        match &msg.statements()[0] {
            Statement::Assert(a) => assert_eq!(
                a.value,
                Value::List(vec![
                    Value::Int(1),
                    Value::String("a".to_string()),
                    Value::Bool(true),
                    Value::Null,
                ])
            ),
            other => panic!("expected Assert, got {other:?}"),
        }
    }

    #[test]
    fn multiple_statements_separated_by_semicolons() {
        let msg = parse_body("A x=1; A y=2");
        assert_eq!(msg.statements().len(), 2);
    }

    #[test]
    fn trailing_semicolon_is_optional() {
        let msg = parse_body("A x=1;");
        assert_eq!(msg.statements().len(), 1);
    }

    #[test]
    fn missing_semicolon_between_statements_errors() {
        assert!(parse_message(&format!("{}\nA x=1 A y=2", header_line())).is_err());
    }

    #[test]
    fn unknown_statement_keyword_errors() {
        assert!(parse_message(&format!("{}\nWAT x=1", header_line())).is_err());
    }
}
