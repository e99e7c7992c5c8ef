use std::collections::HashMap;

/// Nickname → member id table for one conversation group.
///
/// The host owns and refreshes it; the pipeline only ever reads a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupState {
    name_to_id: HashMap<String, String>,
}

impl GroupState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, nickname: impl Into<String>, id: impl Into<String>) {
        self.name_to_id.insert(nickname.into(), id.into());
    }

    #[must_use]
    pub fn lookup(&self, nickname: &str) -> Option<&str> {
        self.name_to_id.get(nickname).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GroupState {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            name_to_id: iter
                .into_iter()
                .map(|(name, id)| (name.into(), id.into()))
                .collect(),
        }
    }
}
