//! Result type alias for Corridor

use super::errors::CorridorError;

/// Result type alias for Corridor operations
///
/// # Examples
///
/// ```
/// use corridor::domain::result::Result;
/// use corridor::domain::errors::CorridorError;
///
/// fn failing_function() -> Result<()> {
///     Err(CorridorError::Transform("empty group".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, CorridorError>;

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
