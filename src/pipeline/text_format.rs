//! Parser for the protobuf-like graph text format.
//!
//! ```text
//! # comment
//! input_stream: "in"
//! output_stream: "out"
//! node {
//!   calculator: "ImageResizeCalculator"
//!   input_stream: "IMAGE:in"
//!   output_stream: "IMAGE:out"
//!   options {
//!     [mediapipe.ImageResizeCalculatorOptions.ext] {
//!       output_width: 416
//!       output_height: 416
//!       scale_mode: "letterbox"
//!     }
//!   }
//! }
//! ```
//!
//! Parsing happens in two steps: the text is read into a generic
//! [`TextMessage`] tree, which is then mapped onto [`GraphConfig`].

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::graph_config::{GraphConfig, NodeConfig, NodeOptions};
use serde_json::{Map, Number, Value};

/// A field value in a text message.
#[derive(Debug, Clone, PartialEq)]
pub enum TextValue {
    Str(String),
    Int(i64),
    Float(f64),
    /// Bare identifier: `true`, `false` or an enum value.
    Ident(String),
    Message(TextMessage),
}

/// Ordered list of `(field, value)` pairs. Repeated fields appear repeatedly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextMessage {
    pub fields: Vec<(String, TextValue)>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Open(char),
    Close(char),
    Colon,
    Separator,
    Dot,
    Slash,
    Eof,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    line: usize,
    column: usize,
}

fn tokenize(input: &str) -> PipelineResult<Vec<Spanned>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let (mut i, mut line, mut column) = (0usize, 1usize, 1usize);

    let err = |line, column, message: String| PipelineError::Parse {
        line,
        column,
        message,
    };

    while i < chars.len() {
        let c = chars[i];
        let (start, start_line, start_column) = (i, line, column);

        if c == '\n' {
            i += 1;
            line += 1;
            column = 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            column += 1;
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let token = match c {
            '{' | '<' | '[' => {
                i += 1;
                Token::Open(c)
            }
            '}' | '>' | ']' => {
                i += 1;
                Token::Close(c)
            }
            ':' => {
                i += 1;
                Token::Colon
            }
            ',' | ';' => {
                i += 1;
                Token::Separator
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(err(start_line, start_column, "unterminated string".into()));
                    };
                    i += 1;
                    if ch == quote {
                        break;
                    }
                    if ch == '\n' {
                        return Err(err(start_line, start_column, "newline in string".into()));
                    }
                    if ch == '\\' {
                        let escaped = chars.get(i).copied().ok_or_else(|| {
                            err(start_line, start_column, "unterminated string".into())
                        })?;
                        i += 1;
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            '0' => '\0',
                            other => other,
                        });
                    } else {
                        value.push(ch);
                    }
                }
                Token::Str(value)
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric()
                        || chars[i] == '.'
                        || ((chars[i] == '-' || chars[i] == '+')
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                Token::Number(chars[start..i].iter().collect())
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                Token::Ident(chars[start..i].iter().collect())
            }
            other => {
                return Err(err(line, column, format!("unexpected character '{other}'")));
            }
        };
        // Tokens never span lines; strings reject raw newlines.
        column = start_column + (i - start);
        tokens.push(Spanned {
            token,
            line: start_line,
            column: start_column,
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
        column,
    });
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Spanned {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Spanned {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> PipelineError {
        let at = self.peek();
        PipelineError::Parse {
            line: at.line,
            column: at.column,
            message: message.into(),
        }
    }

    fn parse_message(&mut self, close: Option<char>) -> PipelineResult<TextMessage> {
        let mut message = TextMessage::default();
        loop {
            match self.peek().token.clone() {
                Token::Eof => {
                    return match close {
                        None => Ok(message),
                        Some(c) => Err(self.error(format!("expected '{c}' before end of input"))),
                    };
                }
                Token::Close(c) if Some(c) == close => {
                    self.bump();
                    return Ok(message);
                }
                Token::Separator => {
                    self.bump();
                }
                _ => {
                    let name = self.parse_field_name()?;
                    let had_colon = matches!(self.peek().token, Token::Colon);
                    if had_colon {
                        self.bump();
                    }
                    match self.peek().token.clone() {
                        Token::Open('[') if had_colon => {
                            self.bump();
                            self.parse_list(&name, &mut message)?;
                        }
                        _ => {
                            let value = self.parse_value()?;
                            message.fields.push((name, value));
                        }
                    }
                }
            }
        }
    }

    fn parse_field_name(&mut self) -> PipelineResult<String> {
        match self.bump().token {
            Token::Ident(name) => Ok(name),
            Token::Open('[') => {
                let mut name = String::from("[");
                loop {
                    match self.bump().token {
                        Token::Ident(part) => name.push_str(&part),
                        Token::Dot => name.push('.'),
                        Token::Slash => name.push('/'),
                        Token::Close(']') => break,
                        _ => return Err(self.error("malformed extension name")),
                    }
                }
                name.push(']');
                Ok(name)
            }
            other => Err(self.error(format!("expected field name, found {other:?}"))),
        }
    }

    fn parse_list(&mut self, name: &str, message: &mut TextMessage) -> PipelineResult<()> {
        loop {
            if let Token::Close(']') = self.peek().token {
                self.bump();
                return Ok(());
            }
            let value = self.parse_value()?;
            message.fields.push((name.to_string(), value));
            match self.peek().token {
                Token::Separator => {
                    self.bump();
                }
                Token::Close(']') => {}
                _ => return Err(self.error("expected ',' or ']' in list")),
            }
        }
    }

    fn parse_value(&mut self) -> PipelineResult<TextValue> {
        match self.bump().token {
            Token::Open('{') => Ok(TextValue::Message(self.parse_message(Some('}'))?)),
            Token::Open('<') => Ok(TextValue::Message(self.parse_message(Some('>'))?)),
            Token::Str(mut s) => {
                // Adjacent string literals concatenate.
                while let Token::Str(next) = &self.peek().token {
                    s.push_str(next);
                    self.bump();
                }
                Ok(TextValue::Str(s))
            }
            Token::Number(n) => {
                parse_number(&n).ok_or_else(|| self.error(format!("invalid number '{n}'")))
            }
            Token::Ident(id) => Ok(TextValue::Ident(id)),
            other => Err(self.error(format!("expected value, found {other:?}"))),
        }
    }
}

fn parse_number(text: &str) -> Option<TextValue> {
    let trimmed = text.trim_end_matches(['f', 'F']);
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(TextValue::Int(i));
    }
    trimmed.parse::<f64>().ok().map(TextValue::Float)
}

/// Parses text into a generic message tree.
pub fn parse(input: &str) -> PipelineResult<TextMessage> {
    let tokens = tokenize(input)?;
    Parser { tokens, pos: 0 }.parse_message(None)
}

/// Parses text into a [`GraphConfig`].
pub fn parse_graph(input: &str) -> PipelineResult<GraphConfig> {
    graph_from_message(&parse(input)?)
}

fn expect_str(field: &str, value: &TextValue) -> PipelineResult<String> {
    match value {
        TextValue::Str(s) => Ok(s.clone()),
        other => Err(PipelineError::Config(format!(
            "field '{field}' expects a string, found {other:?}"
        ))),
    }
}

fn expect_usize(field: &str, value: &TextValue) -> PipelineResult<usize> {
    match value {
        TextValue::Int(i) if *i >= 0 => Ok(*i as usize),
        other => Err(PipelineError::Config(format!(
            "field '{field}' expects a non-negative integer, found {other:?}"
        ))),
    }
}

fn expect_message<'a>(field: &str, value: &'a TextValue) -> PipelineResult<&'a TextMessage> {
    match value {
        TextValue::Message(m) => Ok(m),
        other => Err(PipelineError::Config(format!(
            "field '{field}' expects a message, found {other:?}"
        ))),
    }
}

fn graph_from_message(message: &TextMessage) -> PipelineResult<GraphConfig> {
    let mut config = GraphConfig::default();
    for (field, value) in &message.fields {
        match field.as_str() {
            "input_stream" => config.input_stream.push(expect_str(field, value)?),
            "output_stream" => config.output_stream.push(expect_str(field, value)?),
            "input_side_packet" => config.input_side_packet.push(expect_str(field, value)?),
            "type" => config.type_name = Some(expect_str(field, value)?),
            "num_threads" => config.num_threads = Some(expect_usize(field, value)?),
            "max_queue_size" => config.max_queue_size = Some(expect_usize(field, value)?),
            "node" => config.node.push(node_from_message(expect_message(field, value)?)?),
            other => {
                return Err(PipelineError::Config(format!("unknown graph field '{other}'")));
            }
        }
    }
    Ok(config)
}

fn node_from_message(message: &TextMessage) -> PipelineResult<NodeConfig> {
    let mut node = NodeConfig::default();
    for (field, value) in &message.fields {
        match field.as_str() {
            "calculator" => node.calculator = expect_str(field, value)?,
            "name" => node.name = Some(expect_str(field, value)?),
            "input_stream" => node.input_stream.push(expect_str(field, value)?),
            "output_stream" => node.output_stream.push(expect_str(field, value)?),
            "input_side_packet" => node.input_side_packet.push(expect_str(field, value)?),
            "options" | "node_options" => {
                node.options = options_from_message(expect_message(field, value)?)?;
            }
            other => {
                return Err(PipelineError::Config(format!("unknown node field '{other}'")));
            }
        }
    }
    if node.calculator.is_empty() {
        return Err(PipelineError::Config("node without 'calculator'".into()));
    }
    Ok(node)
}

fn options_from_message(message: &TextMessage) -> PipelineResult<NodeOptions> {
    let extensions: Vec<&(String, TextValue)> = message
        .fields
        .iter()
        .filter(|(name, _)| name.starts_with('['))
        .collect();
    match extensions.as_slice() {
        [] => Ok(NodeOptions {
            extension: None,
            values: message_to_json(message),
        }),
        [(name, value)] if message.fields.len() == 1 => Ok(NodeOptions {
            extension: Some(name.trim_matches(['[', ']']).to_string()),
            values: message_to_json(expect_message(name, value)?),
        }),
        _ => Err(PipelineError::Config(
            "options must hold either plain fields or exactly one extension".into(),
        )),
    }
}

/// Converts a message to a JSON object. Repeated fields become arrays.
pub fn message_to_json(message: &TextMessage) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, value) in &message.fields {
        let json = value_to_json(value);
        match map.get_mut(name) {
            Some(Value::Array(items)) => items.push(json),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, json]);
            }
            None => {
                map.insert(name.clone(), json);
            }
        }
    }
    map
}

fn value_to_json(value: &TextValue) -> Value {
    match value {
        TextValue::Str(s) => Value::String(s.clone()),
        TextValue::Int(i) => Value::Number((*i).into()),
        TextValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        TextValue::Ident(id) => match id.as_str() {
            "true" | "True" => Value::Bool(true),
            "false" | "False" => Value::Bool(false),
            other => Value::String(other.to_string()),
        },
        TextValue::Message(m) => Value::Object(message_to_json(m)),
    }
}
