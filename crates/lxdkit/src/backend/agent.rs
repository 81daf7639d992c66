//! Request plumbing shared by the `ureq`-backed transports.

use super::rest::Method;
use crate::error::{Error, Result};
use serde_json::Value;
use ureq::Agent;

/// Send one request through `agent` and decode the JSON body.
///
/// Status codes never become errors here; the envelope decides.
pub(super) fn exchange(
    agent: &Agent,
    endpoint: &str,
    url: &str,
    method: Method,
    body: Option<&Value>,
) -> Result<(u16, Value)> {
    let result = match (method, body) {
        (Method::Get, _) => agent.get(url).call(),
        (Method::Delete, _) => agent.delete(url).call(),
        (Method::Post, Some(body)) => agent.post(url).send_json(body),
        (Method::Post, None) => agent.post(url).send_empty(),
        (Method::Put, Some(body)) => agent.put(url).send_json(body),
        (Method::Put, None) => agent.put(url).send_empty(),
    };

    let mut response = result.map_err(|e| Error::from_transport(endpoint, &e))?;
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| Error::from_transport(endpoint, &e))?;

    if text.trim().is_empty() {
        return Ok((status, Value::Null));
    }
    Ok((status, serde_json::from_str(&text)?))
}
