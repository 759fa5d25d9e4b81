//! Tri-state desired fields
//!
//! A desired spec only pins the fields the user wrote down. [`Field::Unset`]
//! means "don't care": it never causes drift and is never sent to the remote
//! API. This keeps `false` and "not specified" apart for booleans.
//!
//! Use it on spec structs together with
//! `#[serde(default, skip_serializing_if = "Field::is_unset")]`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Field<T> {
    #[default]
    Unset,
    Set(T),
}

impl<T> Field<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Field::Set(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Field::Unset)
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Set(v) => Field::Set(v),
            Field::Unset => Field::Unset,
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Field::Set(v) => Some(v),
            Field::Unset => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Set(v) => Some(v),
            Field::Unset => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Set(v) => Field::Set(f(v)),
            Field::Unset => Field::Unset,
        }
    }

    /// `true` when unset, otherwise the predicate applied to the desired value
    pub fn matches_with(&self, f: impl FnOnce(&T) -> bool) -> bool {
        match self {
            Field::Set(v) => f(v),
            Field::Unset => true,
        }
    }
}

impl<T: PartialEq> Field<T> {
    /// Compare against an observed value. Unset always matches.
    pub fn matches(&self, observed: &T) -> bool {
        self.matches_with(|desired| desired == observed)
    }

    /// Compare against an optional observed value. A set field never matches
    /// an absent observation.
    pub fn matches_opt(&self, observed: Option<&T>) -> bool {
        self.matches_with(|desired| observed == Some(desired))
    }
}

impl<T: Ord + Clone> Field<Vec<T>> {
    /// Order-insensitive comparison for naturally unordered collections
    pub fn matches_unordered(&self, observed: &[T]) -> bool {
        self.matches_with(|desired| unordered_eq(desired, observed))
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Set(v),
            None => Field::Unset,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Set(v) => v.serialize(serializer),
            Field::Unset => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}

/// Multiset equality: same length, same elements, any order
pub fn unordered_eq<T: Ord + Clone>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Element-wise comparison where position matters (rule precedence).
/// `eq` decides whether one desired element matches one observed element.
pub fn ordered_eq<D, O>(desired: &[D], observed: &[O], eq: impl Fn(&D, &O) -> bool) -> bool {
    desired.len() == observed.len() && desired.iter().zip(observed).all(|(d, o)| eq(d, o))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Settings {
        #[serde(default, skip_serializing_if = "Field::is_unset")]
        enabled: Field<bool>,
        #[serde(default, skip_serializing_if = "Field::is_unset")]
        ttl: Field<u32>,
    }

    #[test]
    fn test_unset_never_drifts() {
        let f: Field<bool> = Field::Unset;
        assert!(f.matches(&true));
        assert!(f.matches(&false));
        assert!(f.matches_opt(None));
    }

    #[test]
    fn test_false_is_not_unset() {
        let f = Field::Set(false);
        assert!(f.matches(&false));
        assert!(!f.matches(&true));
        assert!(!f.matches_opt(None));
    }

    #[test]
    fn test_unordered_lists() {
        let desired = Field::Set(vec!["a".to_string(), "b".to_string()]);
        assert!(desired.matches_unordered(&["b".to_string(), "a".to_string()]));
        assert!(!desired.matches_unordered(&["a".to_string()]));
        assert!(!desired.matches_unordered(&[
            "a".to_string(),
            "b".to_string(),
            "b".to_string()
        ]));
    }

    #[test]
    fn test_ordered_lists() {
        assert!(ordered_eq(&[1, 2], &[1, 2], |a, b| a == b));
        assert!(!ordered_eq(&[1, 2], &[2, 1], |a, b| a == b));
        assert!(!ordered_eq(&[1], &[1, 2], |a, b| a == b));
    }

    #[test]
    fn test_serde_absent_and_null_are_unset() {
        let s: Settings = serde_json::from_str(r#"{"enabled": false, "ttl": null}"#).unwrap();
        assert_eq!(s.enabled, Field::Set(false));
        assert_eq!(s.ttl, Field::Unset);

        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"enabled":false}"#);
    }
}
