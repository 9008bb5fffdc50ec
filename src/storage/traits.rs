use std::rc::Rc;

use anyhow::Result;
use url::Url;

/// The document location as the browser exposes it
pub trait Location {
    /// Current URL, including query and fragment
    fn href(&self) -> Url;

    /// Referrer of the navigation that produced the current document.
    /// `None` when the browser reports an empty referrer.
    fn referrer(&self) -> Option<String>;

    /// Replace the current history entry without navigating or reloading.
    fn replace_state(&self, url: Url) -> Result<()>;
}

/// String key-value storage (tab session or browser profile).
///
/// Implementations may fail at any call, e.g. on quota exhaustion or in
/// privacy modes; callers decide how to recover.
pub trait KeyValueStore {
    /// Read a value. Returns `Ok(None)` if the key was never written.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Returns Ok(()) even if the key didn't exist.
    fn remove_item(&self, key: &str) -> Result<()>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }
}
