/// Split a stored keyword column into its entries, keeping order.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

/// Case-insensitive "contains any of" filter.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    needles: Vec<String>,
}

impl KeywordFilter {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let needles = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { needles }
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    /// First keyword found in `content`, if any.
    pub fn find_match(&self, content: &str) -> Option<&str> {
        if content.is_empty() || self.needles.is_empty() {
            return None;
        }
        let haystack = content.to_lowercase();
        self.needles
            .iter()
            .find(|needle| haystack.contains(needle.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, content: &str) -> bool {
        self.find_match(content).is_some()
    }
}
