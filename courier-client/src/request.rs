//! Request payloads and envelope wrapping.
//!
//! A [`Request`] is opaque to this layer: the session transport owns the wire
//! encoding. What this layer does own is the *envelope stack* — the ordered
//! set of wrappers (delegation, update suppression, takeout) that change how
//! the server interprets a request without changing the inner payload.

// ─── Request ──────────────────────────────────────────────────────────────────

/// An opaque, immutable remote call: method name plus serialized arguments.
///
/// Built once by the caller and never mutated afterwards; the session
/// transport is the only component that looks inside [`body`](Self::body).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    method: String,
    body:   Vec<u8>,
}

impl Request {
    /// Create a request for `method` with already-serialized arguments.
    pub fn new(method: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self { method: method.into(), body: body.into() }
    }

    /// The remote operation name.
    pub fn method(&self) -> &str { &self.method }

    /// The serialized arguments, as given at construction.
    pub fn body(&self) -> &[u8] { &self.body }
}

// ─── Envelope ─────────────────────────────────────────────────────────────────

/// A wrapper changing server-side interpretation of the inner request.
///
/// Envelopes compose by nesting and the nesting order is fixed by
/// [`envelope_stack`], not by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Envelope {
    /// Issue the request on behalf of a delegate (business) connection.
    Delegate { connection_id: String },
    /// Ask the server not to emit updates caused by this request.
    SuppressUpdates,
    /// Bind the request to an active takeout session.
    Takeout { takeout_id: i64 },
}

/// A request together with the envelopes applied to it.
///
/// `envelopes[0]` is the innermost wrapper, the last element the outermost.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wrapped {
    pub request:   Request,
    pub envelopes: Vec<Envelope>,
}

impl Wrapped {
    /// A request with no envelopes applied.
    pub fn bare(request: Request) -> Self {
        Self { request, envelopes: Vec::new() }
    }
}

/// Compute the envelope stack for one dispatch.
///
/// Wrapping order, innermost to outermost: delegate, then suppress-updates,
/// then takeout. Each layer is applied only when its condition holds.
pub(crate) fn envelope_stack(
    delegate_connection_id: Option<&str>,
    suppress_updates: bool,
    takeout_id: Option<i64>,
) -> Vec<Envelope> {
    let mut stack = Vec::new();
    if let Some(connection_id) = delegate_connection_id {
        stack.push(Envelope::Delegate { connection_id: connection_id.to_string() });
    }
    if suppress_updates {
        stack.push(Envelope::SuppressUpdates);
    }
    if let Some(takeout_id) = takeout_id {
        stack.push(Envelope::Takeout { takeout_id });
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_conditions_no_envelopes() {
        assert!(envelope_stack(None, false, None).is_empty());
    }

    #[test]
    fn full_stack_order_is_delegate_suppress_takeout() {
        let stack = envelope_stack(Some("conn-1"), true, Some(99));
        assert_eq!(stack, vec![
            Envelope::Delegate { connection_id: "conn-1".into() },
            Envelope::SuppressUpdates,
            Envelope::Takeout { takeout_id: 99 },
        ]);
    }

    #[test]
    fn partial_stacks_keep_relative_order() {
        let stack = envelope_stack(None, true, Some(7));
        assert_eq!(stack, vec![
            Envelope::SuppressUpdates,
            Envelope::Takeout { takeout_id: 7 },
        ]);

        let stack = envelope_stack(Some("c"), false, Some(7));
        assert_eq!(stack, vec![
            Envelope::Delegate { connection_id: "c".into() },
            Envelope::Takeout { takeout_id: 7 },
        ]);
    }

    #[test]
    fn bare_request_has_no_envelopes() {
        let wrapped = Wrapped::bare(Request::new("help.getConfig", vec![]));
        assert!(wrapped.envelopes.is_empty());
        assert_eq!(wrapped.request.method(), "help.getConfig");
    }
}
