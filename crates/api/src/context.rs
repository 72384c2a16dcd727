/// Who is acting on the ledger for this request.
///
/// Taken from the `x-responsible-party` header; absent when the caller did not
/// identify itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    responsible_party: Option<String>,
}

impl RequestContext {
    pub fn new(responsible_party: Option<String>) -> Self {
        Self { responsible_party }
    }

    pub fn responsible_party(&self) -> Option<&str> {
        self.responsible_party.as_deref()
    }
}
