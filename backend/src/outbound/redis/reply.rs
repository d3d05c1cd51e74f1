//! Decoding of stream replies from `XREADGROUP`.
//!
//! Replies arrive as nested arrays under RESP2 and as a map of stream name to
//! entries under RESP3; both shapes are accepted.

use bb8_redis::redis::Value;

/// One stream entry. `fields` is `None` when the entry was deleted after it
/// was delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamEntry {
    pub id: String,
    pub fields: Option<Vec<(String, String)>>,
}

/// Extract the first entry of the first stream in an `XREADGROUP` reply.
pub(crate) fn first_entry(reply: Value) -> Result<Option<StreamEntry>, String> {
    let streams = match reply {
        Value::Nil => return Ok(None),
        Value::Array(streams) => streams
            .into_iter()
            .map(stream_entries)
            .collect::<Result<Vec<_>, _>>()?,
        Value::Map(pairs) => pairs.into_iter().map(|(_, entries)| entries).collect(),
        other => return Err(format!("unexpected XREADGROUP reply: {other:?}")),
    };

    let Some(entries) = streams.into_iter().next() else {
        return Ok(None);
    };
    let entries = match entries {
        Value::Array(entries) => entries,
        Value::Nil => return Ok(None),
        other => return Err(format!("unexpected stream entries: {other:?}")),
    };
    entries.into_iter().next().map(entry).transpose()
}

fn stream_entries(stream: Value) -> Result<Value, String> {
    match stream {
        Value::Array(mut pair) if pair.len() == 2 => pair
            .pop()
            .ok_or_else(|| "stream reply missing entries".to_owned()),
        other => Err(format!("unexpected stream reply: {other:?}")),
    }
}

fn entry(value: Value) -> Result<StreamEntry, String> {
    let Value::Array(parts) = value else {
        return Err(format!("unexpected stream entry: {value:?}"));
    };
    let mut parts = parts.into_iter();
    let id = parts
        .next()
        .ok_or_else(|| "stream entry missing id".to_owned())
        .and_then(text)?;
    let fields = match parts.next() {
        None | Some(Value::Nil) => None,
        Some(Value::Array(flat)) => Some(pairs(flat)?),
        Some(Value::Map(map)) => Some(
            map.into_iter()
                .map(|(field, value)| Ok((text(field)?, text(value)?)))
                .collect::<Result<Vec<_>, String>>()?,
        ),
        Some(other) => return Err(format!("unexpected stream fields: {other:?}")),
    };
    Ok(StreamEntry { id, fields })
}

fn pairs(flat: Vec<Value>) -> Result<Vec<(String, String)>, String> {
    if flat.len() % 2 != 0 {
        return Err("stream fields are not paired".to_owned());
    }
    let mut values = flat.into_iter();
    let mut pairs = Vec::with_capacity(values.len() / 2);
    while let (Some(field), Some(value)) = (values.next(), values.next()) {
        pairs.push((text(field)?, text(value)?));
    }
    Ok(pairs)
}

fn text(value: Value) -> Result<String, String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes).map_err(|err| err.to_string()),
        Value::SimpleString(text) => Ok(text),
        Value::Int(number) => Ok(number.to_string()),
        other => Err(format!("expected text, found {other:?}")),
    }
}
