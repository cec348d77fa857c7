use crate::error::{ScimError, ScimResult};

/// Pagination window parsed from `startIndex` / `count` query parameters.
/// `start_index` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub start_index: i64,
    pub count: i64,
}

impl PageParams {
    pub fn from_params(
        start_index: Option<i64>,
        count: Option<i64>,
        default_count: i64,
    ) -> ScimResult<PageParams> {
        let start_index = start_index.unwrap_or(1);
        if start_index < 1 {
            return Err(ScimError::InvalidUri(format!(
                "startIndex must be >= 1, got {}",
                start_index
            )));
        }
        let count = count.unwrap_or(default_count);
        if count < 0 {
            return Err(ScimError::InvalidUri(format!(
                "count must be >= 0, got {}",
                count
            )));
        }
        Ok(PageParams { start_index, count })
    }

    /// The window as a 0-based offset and length.
    pub fn window(&self) -> (usize, usize) {
        ((self.start_index - 1) as usize, self.count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let page = PageParams::from_params(None, None, 100).unwrap();
        assert_eq!(page.start_index, 1);
        assert_eq!(page.count, 100);
    }

    #[test]
    fn test_bounds() {
        assert!(PageParams::from_params(Some(0), None, 100).is_err());
        assert!(PageParams::from_params(None, Some(-1), 100).is_err());
        let page = PageParams::from_params(Some(3), Some(0), 100).unwrap();
        assert_eq!(page.window(), (2, 0));
    }
}
