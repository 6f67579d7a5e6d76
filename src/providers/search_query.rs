//! Builder for issue and pull request search qualifiers.
//!
//! ```
//! use gitfetch::providers::SearchQuery;
//!
//! let query = SearchQuery::new().is_pr().state_open().author("octocat").build();
//! assert_eq!(query, "is:pr state:open author:octocat");
//! ```

use crate::models::SearchCategory;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    qualifiers: Vec<String>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    pub fn is_pr(self) -> Self {
        self.push("is:pr")
    }

    pub fn is_issue(self) -> Self {
        self.push("is:issue")
    }

    pub fn state_open(self) -> Self {
        self.push("state:open")
    }

    pub fn state_closed(self) -> Self {
        self.push("state:closed")
    }

    pub fn is_draft(self) -> Self {
        self.push("is:draft")
    }

    pub fn is_merged(self) -> Self {
        self.push("is:merged")
    }

    pub fn author(self, username: &str) -> Self {
        self.push(format!("author:{}", username))
    }

    pub fn assignee(self, username: &str) -> Self {
        self.push(format!("assignee:{}", username))
    }

    pub fn commenter(self, username: &str) -> Self {
        self.push(format!("commenter:{}", username))
    }

    pub fn mentions(self, username: &str) -> Self {
        self.push(format!("mentions:{}", username))
    }

    pub fn review_requested(self, username: &str) -> Self {
        self.push(format!("review-requested:{}", username))
    }

    /// `date` is `YYYY-MM-DD`.
    pub fn closed_after(self, date: &str) -> Self {
        self.push(format!("closed:>={}", date))
    }

    pub fn created_after(self, date: &str) -> Self {
        self.push(format!("created:>{}", date))
    }

    pub fn updated_after(self, date: &str) -> Self {
        self.push(format!("updated:>{}", date))
    }

    pub fn in_repo(self, repo: &str) -> Self {
        self.push(format!("repo:{}", repo))
    }

    pub fn label(self, label: &str) -> Self {
        self.push(format!("label:{}", label))
    }

    pub fn no_label(self) -> Self {
        self.push("no:label")
    }

    pub fn custom(self, qualifier: &str) -> Self {
        self.push(qualifier)
    }

    pub fn is_empty(&self) -> bool {
        self.qualifiers.is_empty()
    }

    pub fn build(&self) -> String {
        self.qualifiers.join(" ")
    }

    /// The query for one of the fixed search categories.
    pub fn for_category(category: SearchCategory, username: &str) -> Self {
        match category {
            SearchCategory::PrAwaitingReview => {
                Self::new().is_pr().state_open().review_requested(username)
            }
            SearchCategory::PrOpenAuthored => Self::new().is_pr().state_open().author(username),
            SearchCategory::PrMentions => Self::new().is_pr().state_open().mentions(username),
            SearchCategory::IssueAssigned => Self::new().is_issue().state_open().assignee(username),
            SearchCategory::IssueOpenAuthored => {
                Self::new().is_issue().state_open().author(username)
            }
            SearchCategory::IssueMentions => Self::new().is_issue().state_open().mentions(username),
        }
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query() {
        let query = SearchQuery::new();
        assert!(query.is_empty());
        assert_eq!(query.build(), "");
    }

    #[test]
    fn test_chained_qualifiers_keep_order() {
        let query = SearchQuery::new()
            .is_pr()
            .state_closed()
            .author("octocat")
            .closed_after("2024-01-01")
            .label("bug")
            .in_repo("rust-lang/rust");
        assert_eq!(
            query.to_string(),
            "is:pr state:closed author:octocat closed:>=2024-01-01 label:bug repo:rust-lang/rust"
        );
    }

    #[test]
    fn test_category_queries() {
        assert_eq!(
            SearchQuery::for_category(SearchCategory::PrAwaitingReview, "me").build(),
            "is:pr state:open review-requested:me"
        );
        assert_eq!(
            SearchQuery::for_category(SearchCategory::IssueAssigned, "me").build(),
            "is:issue state:open assignee:me"
        );
        assert_eq!(
            SearchQuery::for_category(SearchCategory::IssueMentions, "me").build(),
            "is:issue state:open mentions:me"
        );
    }

    #[test]
    fn test_custom_and_draft_qualifiers() {
        let query = SearchQuery::new().is_pr().is_draft().custom("archived:false").no_label();
        assert_eq!(query.build(), "is:pr is:draft archived:false no:label");
    }
}
