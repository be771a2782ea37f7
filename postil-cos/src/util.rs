use log::warn;

pub(crate) trait OptionLog {
    /// Log a warning when the option is `None`, then pass it through.
    fn warn_none(self, f: &str) -> Self;
}

impl<T> OptionLog for Option<T> {
    fn warn_none(self, f: &str) -> Self {
        self.or_else(|| {
            warn!("{f}");

            None
        })
    }
}
