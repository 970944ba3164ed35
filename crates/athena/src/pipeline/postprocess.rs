//! Keyword index rebuild

use super::Pipeline;
use crate::error::Result;
use crate::search::tokenize;
use std::collections::HashMap;
use tracing::info;

/// Count filename tokens: each name contributes once per token occurrence.
pub fn keyword_counts<I, S>(filenames: I) -> HashMap<String, u64>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = HashMap::new();
    for name in filenames {
        for token in tokenize(name.as_ref()) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    counts
}

impl Pipeline {
    /// Rebuild the keyword index from every stored filename.
    pub async fn post_processing(&self) -> Result<usize> {
        let filenames = self.repo.list_filenames().await?;
        let counts = keyword_counts(&filenames);
        self.repo.rebuild_keyword_index(&counts).await?;

        info!(files = filenames.len(), keywords = counts.len(), "Keyword index rebuilt");
        Ok(counts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_counts() {
        let counts = keyword_counts(["Game.of.Thrones.S01E01.mkv", "thrones-2.mkv", "notes"]);

        assert_eq!(counts.get("thrones"), Some(&2));
        assert_eq!(counts.get("mkv"), Some(&2));
        assert_eq!(counts.get("s01e01"), Some(&1));
        assert_eq!(counts.get("notes"), Some(&1));
        assert_eq!(counts.get("."), None);
    }
}
