//! Content-Type and Accept parsing.
//!
//! # Responsibilities
//! - Parse media types (`type/subtype; k=v; ...`)
//! - Split Accept into media ranges and read their quality
//! - Pick the request and response formats
//!
//! # Design Decisions
//! - A bare `type` without `/subtype` is syntactically valid but never
//!   recognized; `type/` or `type//x` is a syntax error
//! - A missing or malformed `q` counts as 1.0
//! - Unrecognized ranges are kept only to tell "nothing supported" apart
//!   from "nothing asked"

use std::collections::HashMap;

use super::{Format, NegotiationError};

const ACCEPT: &str = "Accept";
const CONTENT_TYPE: &str = "Content-Type";

/// One entry of an Accept header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub media_type: String,
    pub params: HashMap<String, String>,
    pub quality: f32,
    /// Format this range resolves to, if the registry knows it.
    pub format: Option<Format>,
}

impl MediaRange {
    pub fn parse(value: &str) -> Result<Self, String> {
        let (media_type, mut params) = parse_media_type(value)?;
        let quality = params
            .remove("q")
            .and_then(|q| q.trim().parse::<f32>().ok())
            .filter(|q| (0.0..=1.0).contains(q))
            .unwrap_or(1.0);
        let format = Format::from_media_type(&media_type, &params);
        Ok(Self {
            media_type,
            params,
            quality,
            format,
        })
    }

    pub fn is_recognized(&self) -> bool {
        self.format.is_some()
    }
}

/// Parses a media type into its lower-cased `type/subtype` and parameters.
pub fn parse_media_type(value: &str) -> Result<(String, HashMap<String, String>), String> {
    let (base, rest) = match value.find(';') {
        Some(i) => (&value[..i], &value[i + 1..]),
        None => (value, ""),
    };

    let media_type = base.trim().to_ascii_lowercase();
    check_media_type(&media_type)?;

    let mut params = HashMap::new();
    for param in split_params(rest) {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let (key, raw) = param
            .split_once('=')
            .ok_or_else(|| format!("invalid media parameter {param:?}"))?;
        let key = key.trim().to_ascii_lowercase();
        if !is_token(&key) {
            return Err(format!("invalid media parameter {param:?}"));
        }
        let value = parse_param_value(raw.trim())
            .ok_or_else(|| format!("invalid media parameter {param:?}"))?;
        if params.insert(key.clone(), value).is_some() {
            return Err(format!("duplicate parameter name {key:?}"));
        }
    }

    Ok((media_type, params))
}

/// Selects the format of the request body from its Content-Type.
pub fn select_request_format(content_type: &str) -> Result<Format, NegotiationError> {
    if content_type.trim().is_empty() {
        return Ok(Format::default());
    }
    let (media_type, params) =
        parse_media_type(content_type).map_err(|reason| NegotiationError::Malformed {
            header: CONTENT_TYPE,
            reason,
        })?;
    Format::from_media_type(&media_type, &params)
        .ok_or_else(|| NegotiationError::UnsupportedMediaType(content_type.to_string()))
}

/// Selects the format of the response body from the Accept header.
pub fn select_response_format(accept: &str) -> Result<Format, NegotiationError> {
    if accept.trim().is_empty() {
        return Ok(Format::default());
    }

    let ranges = accept
        .split(',')
        .map(MediaRange::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| NegotiationError::Malformed {
            header: ACCEPT,
            reason,
        })?;

    let mut best: Option<(Format, f32)> = None;
    for range in &ranges {
        let Some(format) = range.format else {
            continue;
        };
        best = match best {
            Some((current, q))
                if q > range.quality || (q == range.quality && current.rank() <= format.rank()) =>
            {
                Some((current, q))
            }
            _ => Some((format, range.quality)),
        };
    }

    best.map(|(format, _)| format)
        .ok_or(NegotiationError::NotAcceptable)
}

fn check_media_type(media_type: &str) -> Result<(), String> {
    let (kind, subtype) = match media_type.split_once('/') {
        Some((kind, subtype)) => (kind, Some(subtype)),
        None => (media_type, None),
    };
    if kind.is_empty() {
        return Err("no media type".to_string());
    }
    if !is_token(kind) {
        return Err(format!("expected token in media type {media_type:?}"));
    }
    match subtype {
        None => Ok(()),
        Some("") => Err(format!("expected token after slash in {media_type:?}")),
        Some(subtype) if !is_token(subtype) => {
            Err(format!("expected token after slash in {media_type:?}"))
        }
        Some(_) => Ok(()),
    }
}

/// Splits on `;` outside of quoted strings.
fn split_params(rest: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                parts.push(&rest[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&rest[start..]);
    parts
}

fn parse_param_value(raw: &str) -> Option<String> {
    if let Some(inner) = raw.strip_prefix('"') {
        let inner = inner.strip_suffix('"')?;
        let mut value = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                value.push(chars.next()?);
            } else {
                value.push(c);
            }
        }
        return Some(value);
    }
    is_token(raw).then(|| raw.to_string())
}

/// RFC 7230 token.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
                        | b'_' | b'`' | b'|' | b'~'
                )
        })
}
