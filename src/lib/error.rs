/// Where an error sits in the failure taxonomy.
///
/// - `Validation`: local input problem, rejected before any collaborator call.
/// - `Transient`: collaborator timeout or outage; retried, and retryable again by the caller.
/// - `Fatal`: malformed responses, definitive rejections, verification failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Transient,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}
