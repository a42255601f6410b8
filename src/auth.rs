use std::collections::HashSet;

/// Identifiers allowed to use restricted commands.
///
/// User ids and chat ids live in the same set, so callers pass both the
/// sender and the chat and either one may grant access.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(Into::into)
                .filter(|id: &String| !id.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        !id.is_empty() && self.ids.contains(id)
    }

    pub fn is_authorized(&self, user_id: &str, chat_id: &str) -> bool {
        self.contains(user_id) || self.contains(chat_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
