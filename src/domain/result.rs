//! Result type alias for Clinistar

use super::errors::ClinistarError;

/// Result type alias for Clinistar operations
///
/// # Examples
///
/// ```
/// use clinistar::domain::result::Result;
/// use clinistar::domain::errors::ClinistarError;
///
/// fn failing_function() -> Result<()> {
///     Err(ClinistarError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ClinistarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
