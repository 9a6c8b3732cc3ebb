use std::collections::HashSet;

/// State shared by everything compiled through one compiler instance.
/// Currently only deduplicates warnings.
#[derive(Debug, Default)]
pub struct Session {
    warned: HashSet<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs `message` the first time `key` is seen. Returns whether it was
    /// logged.
    pub fn warn_once(&mut self, key: &str, message: &str) -> bool {
        if !self.warned.insert(key.to_string()) {
            return false;
        }

        log::warn!("{message}");
        true
    }

    pub fn warning_count(&self) -> usize {
        self.warned.len()
    }

    pub fn reset(&mut self) {
        self.warned.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warns_once_per_key_until_reset() {
        let mut session = Session::new();

        assert!(session.warn_once("type:Foo", "unknown type Foo"));
        assert!(!session.warn_once("type:Foo", "unknown type Foo"));
        assert!(session.warn_once("type:Bar", "unknown type Bar"));
        assert!(session.warning_count() == 2);

        session.reset();

        assert!(session.warn_once("type:Foo", "unknown type Foo"));
    }
}
