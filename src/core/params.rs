//! Parameter files for the registration engine
//!
//! A parameter file is a sequence of `(key value ...)` records, one per line.
//! Values are typed per token: `true`/`false` are booleans, integer literals
//! are integers, decimal literals are floats and anything else is a string
//! (surrounding quotes stripped). A record with several tokens is a list.
//! Text after `//` outside a quoted string is a comment.

use crate::core::error::{RegistrationError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Key holding the learned transform parameters in a transform file
pub const TRANSFORM_PARAMETERS: &str = "TransformParameters";

/// A single typed value from a parameter file
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Numeric value, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::List(values) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// View any value as a sequence: lists as-is, scalars as one element
    pub fn to_vec(&self) -> Vec<ParamValue> {
        match self {
            ParamValue::List(values) => values.clone(),
            scalar => vec![scalar.clone()],
        }
    }

    /// Encode the value part of a record (everything after the key)
    fn encode(&self) -> Result<String> {
        match self {
            ParamValue::List(values) => {
                if values.is_empty() {
                    return Err(RegistrationError::Schema(
                        "empty lists cannot be written".to_string(),
                    ));
                }
                let tokens = values
                    .iter()
                    .map(encode_scalar)
                    .collect::<Result<Vec<_>>>()?;
                Ok(tokens.join(" "))
            }
            scalar => encode_scalar(scalar),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{:?}", x),
            ParamValue::Str(s) => write!(f, "\"{}\"", s),
            ParamValue::List(values) => {
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", value)?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Ordered key/value mapping read from or written to a parameter file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert a value, keeping the original position if the key exists
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Option<ParamValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to parameter-file text, one record per line
    pub fn to_text(&self) -> Result<String> {
        let mut text = String::new();
        for (key, value) in &self.entries {
            text.push_str(&format_record(key, value)?);
            text.push('\n');
        }
        Ok(text)
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = ParameterSet::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

/// What `adjust` does with override keys the source file does not contain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingKeyPolicy {
    /// Append the record at the end of the file
    #[default]
    Append,
    /// Fail with `RegistrationError::MissingKey`
    Strict,
}

/// Read a parameter file
pub fn read<P: AsRef<Path>>(path: P) -> Result<ParameterSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    parse_with_origin(&text, path)
}

/// Parse parameter-file text held in memory
pub fn parse(text: &str) -> Result<ParameterSet> {
    parse_with_origin(text, Path::new("<memory>"))
}

/// Write a parameter set, one record per key in insertion order
pub fn write<P: AsRef<Path>>(path: P, params: &ParameterSet) -> Result<()> {
    let text = params.to_text()?;
    fs::write(path.as_ref(), text)?;
    debug!("Wrote {} parameters to {}", params.len(), path.as_ref().display());
    Ok(())
}

/// Copy `src` to `dst`, rewriting only the records named in `overrides`
///
/// All other lines pass through unchanged. Override keys absent from `src`
/// are appended or rejected depending on `policy`.
pub fn adjust<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dst: Q,
    overrides: &ParameterSet,
    policy: MissingKeyPolicy,
) -> Result<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    let text = fs::read_to_string(src)?;

    let mut output = String::with_capacity(text.len());
    let mut replaced: HashSet<String> = HashSet::new();

    for line in text.split_inclusive('\n') {
        let replacement = record_key(line).and_then(|key| overrides.get(key).map(|v| (key, v)));
        match replacement {
            Some((key, value)) => {
                let indent_len = line.len() - line.trim_start().len();
                let body = line.trim_end_matches(['\r', '\n']);
                // Whatever follows the record itself, usually a comment
                let trailing = &body[strip_comment(body).trim_end().len()..];
                output.push_str(&line[..indent_len]);
                output.push_str(&format_record(key, value)?);
                output.push_str(trailing);
                output.push_str(line_ending(line));
                replaced.insert(key.to_string());
            }
            None => output.push_str(line),
        }
    }

    let missing: Vec<(&str, &ParamValue)> = overrides
        .iter()
        .filter(|(key, _)| !replaced.contains(*key))
        .collect();

    if let (MissingKeyPolicy::Strict, Some((key, _))) = (policy, missing.first()) {
        return Err(RegistrationError::MissingKey(key.to_string()));
    }

    if !missing.is_empty() && !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    for (key, value) in missing {
        output.push_str(&format_record(key, value)?);
        output.push('\n');
    }

    fs::write(dst, output)?;
    debug!(
        "Adjusted {} -> {} ({} overrides)",
        src.display(),
        dst.display(),
        overrides.len()
    );
    Ok(())
}

/// Subtract `(dx, dy, dz)` from the translation part of a transform file
///
/// The first three `TransformParameters` are taken as the (x, y, z)
/// translation and the result is `input - shift`, the engine's convention
/// that a registered point's offset says where that point came from. Any
/// further parameters are left as they are.
pub fn shift_translation<P: AsRef<Path>, Q: AsRef<Path>>(
    tfile: P,
    dx: f64,
    dy: f64,
    dz: f64,
    dst: Q,
) -> Result<()> {
    let tfile = tfile.as_ref();
    let params = read(tfile)?;
    let mut values = params
        .get(TRANSFORM_PARAMETERS)
        .map(ParamValue::to_vec)
        .ok_or_else(|| {
            RegistrationError::Schema(format!(
                "{} has no {}",
                tfile.display(),
                TRANSFORM_PARAMETERS
            ))
        })?;

    if values.len() < 3 {
        return Err(RegistrationError::Schema(format!(
            "{} has {} translation parameters, expected at least 3",
            tfile.display(),
            values.len()
        )));
    }

    for (value, shift) in values.iter_mut().zip([dx, dy, dz]) {
        let current = value.as_f64().ok_or_else(|| {
            RegistrationError::Schema(format!("non-numeric transform parameter {}", value))
        })?;
        *value = ParamValue::Float(current - shift);
    }

    let overrides = ParameterSet::new().with(TRANSFORM_PARAMETERS, ParamValue::List(values));
    adjust(tfile, dst, &overrides, MissingKeyPolicy::Strict)
}

/// Decode free text using the per-token typing rule (e.g. CLI overrides)
pub fn decode_value(text: &str) -> ParamValue {
    match tokenize(text) {
        Ok(tokens) if tokens.len() == 1 => decode_token(&tokens[0]),
        Ok(tokens) if !tokens.is_empty() => {
            ParamValue::List(tokens.iter().map(decode_token).collect())
        }
        _ => ParamValue::Str(text.to_string()),
    }
}

fn parse_with_origin(text: &str, origin: &Path) -> Result<ParameterSet> {
    let mut params = ParameterSet::new();
    for (index, line) in text.lines().enumerate() {
        let record = parse_record(line).map_err(|message| RegistrationError::Parse {
            path: PathBuf::from(origin),
            line: index + 1,
            message,
        })?;
        if let Some((key, value)) = record {
            params.insert(key, value);
        }
    }
    Ok(params)
}

#[derive(Debug)]
struct Token {
    text: String,
    quoted: bool,
}

fn parse_record(line: &str) -> std::result::Result<Option<(String, ParamValue)>, String> {
    let content = strip_comment(line).trim();
    if content.is_empty() {
        return Ok(None);
    }

    let body = content
        .strip_prefix('(')
        .ok_or_else(|| format!("expected '(' at start of record: {}", content))?
        .strip_suffix(')')
        .ok_or_else(|| "unbalanced parentheses".to_string())?;

    let tokens = tokenize(body)?;
    let (key, values) = match tokens.split_first() {
        Some((key, values)) if !key.quoted && !key.text.is_empty() => (key, values),
        _ => return Err("empty key".to_string()),
    };

    let value = match values {
        [] => return Err(format!("record '{}' has no value", key.text)),
        [single] => decode_token(single),
        many => ParamValue::List(many.iter().map(decode_token).collect()),
    };

    Ok(Some((key.text.clone(), value)))
}

fn tokenize(body: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => text.push(ch),
                    None => return Err("unterminated string".to_string()),
                }
            }
            tokens.push(Token { text, quoted: true });
        } else {
            let mut text = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                match ch {
                    '(' | ')' => return Err("unbalanced parentheses".to_string()),
                    '"' => return Err(format!("unexpected quote after '{}'", text)),
                    _ => {}
                }
                text.push(ch);
                chars.next();
            }
            tokens.push(Token { text, quoted: false });
        }
    }

    Ok(tokens)
}

fn decode_token(token: &Token) -> ParamValue {
    match token.text.as_str() {
        "true" => return ParamValue::Bool(true),
        "false" => return ParamValue::Bool(false),
        _ => {}
    }
    if token.quoted {
        return ParamValue::Str(token.text.clone());
    }
    if let Ok(i) = token.text.parse::<i64>() {
        return ParamValue::Int(i);
    }
    if looks_numeric(&token.text) {
        if let Ok(f) = token.text.parse::<f64>() {
            return ParamValue::Float(f);
        }
    }
    ParamValue::Str(token.text.clone())
}

/// Rejects words like `inf` or `NaN` that `f64::from_str` would accept
fn looks_numeric(text: &str) -> bool {
    let digits = text.trim_start_matches(['+', '-']);
    digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && digits.chars().any(|c| c.is_ascii_digit())
}

fn encode_scalar(value: &ParamValue) -> Result<String> {
    match value {
        ParamValue::Bool(b) => Ok(b.to_string()),
        ParamValue::Int(i) => Ok(i.to_string()),
        ParamValue::Float(f) => {
            if !f.is_finite() {
                return Err(RegistrationError::Schema(format!(
                    "non-finite value {} cannot be written",
                    f
                )));
            }
            // Debug formatting always keeps a '.' or an exponent, so the
            // value reads back as a float
            Ok(format!("{:?}", f))
        }
        ParamValue::Str(s) => {
            if s.contains('"') {
                return Err(RegistrationError::Schema(format!(
                    "string value {:?} contains a quote",
                    s
                )));
            }
            if s.contains(['\n', '\r']) {
                return Err(RegistrationError::Schema(format!(
                    "string value {:?} spans more than one line",
                    s
                )));
            }
            Ok(format!("\"{}\"", s))
        }
        ParamValue::List(_) => Err(RegistrationError::Schema(
            "nested lists cannot be written".to_string(),
        )),
    }
}

fn format_record(key: &str, value: &ParamValue) -> Result<String> {
    if !is_valid_key(key) {
        return Err(RegistrationError::Schema(format!(
            "key {:?} cannot be written as a record",
            key
        )));
    }
    Ok(format!("({} {})", key, value.encode()?))
}

/// Same character class as `record_key`
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '"' | '/'))
}

fn strip_comment(line: &str) -> &str {
    let mut in_quote = false;
    let mut prev_slash = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => {
                in_quote = !in_quote;
                prev_slash = false;
            }
            '/' if !in_quote => {
                if prev_slash {
                    return &line[..i - 1];
                }
                prev_slash = true;
            }
            _ => prev_slash = false,
        }
    }
    line
}

fn record_key(line: &str) -> Option<&str> {
    static RECORD_KEY: OnceLock<Regex> = OnceLock::new();
    let regex = RECORD_KEY
        .get_or_init(|| Regex::new(r#"^\s*\(\s*([^\s()"/]+)"#).expect("valid record regex"));
    regex.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn line_ending(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else if line.ends_with('\n') {
        "\n"
    } else {
        ""
    }
}
