/// Boxed error used at collaborator seams where the concrete error type belongs to
/// another component (runtime factories, usage watchers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub trait ResultOkLogExt<T, E> {
    /// Converts the result into an [`Option`], logging the error at `level` if there is one.
    fn ok_log(self, level: log::Level) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn ok_log(self, level: log::Level) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::log!(level, "{err}");
                None
            }
        }
    }
}
