use crate::domain::{ExtractError, ExtractedPage};

/// Markup query capability: turns rendered page content into field tables.
///
/// A missing page-identity marker is [`ExtractError::WrongPage`], a hard
/// failure for that task.
pub trait MarkupExtractor: Send + Sync {
    fn extract(&self, markup: &str) -> Result<ExtractedPage, ExtractError>;
}
