use crate::application_port::RefreshError;

/// Told once per transition into the logged-out state, so the caller can send
/// the user back to a login entry point.
pub trait SessionListener: Send + Sync {
    fn session_ended(&self, error: &RefreshError);
}

impl<F> SessionListener for F
where
    F: Fn(&RefreshError) + Send + Sync,
{
    fn session_ended(&self, error: &RefreshError) {
        self(error)
    }
}
