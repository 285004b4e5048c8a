use crate::PiolResult;

/// Extension trait for PiolResult
pub trait ResultExt<T>: private::Sealed {
    /// Flatten a nested [`PiolResult`]. Helper function until <https://github.com/rust-lang/rust/issues/70142> is stabilized.
    fn flatten(self) -> PiolResult<T>;
}

mod private {
    use crate::PiolResult;

    pub trait Sealed {}

    impl<T> Sealed for PiolResult<PiolResult<T>> {}
}

impl<T> ResultExt<T> for PiolResult<PiolResult<T>> {
    fn flatten(self) -> PiolResult<T> {
        match self {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) | Err(e) => Err(e),
        }
    }
}
