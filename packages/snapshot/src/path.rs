//! Field paths into a snapshot tree.

use std::fmt;

/// A path string that does not name a location in a snapshot.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// A component is neither an identifier nor a sequence index.
    #[error("invalid path component '{component}' at position {position}: {message}")]
    InvalidComponent {
        component: String,
        position: usize,
        message: String,
    },
}

/// A validated path from a snapshot root down to a nested value.
///
/// Components are field names (Unicode identifiers per UAX#31) or numeric
/// strings used as sequence indices, so `data/name` and `items/0/title` are
/// both valid paths.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    pub(crate) components: Vec<String>,
}

impl Path {
    /// Parse a path string, validating components.
    ///
    /// Components are separated by `/`. Empty components are ignored, which
    /// normalizes `//` and leading or trailing slashes.
    ///
    /// ```rust
    /// use class_state_snapshot::Path;
    ///
    /// let path = Path::parse("data/name").unwrap();
    /// assert_eq!(path.len(), 2);
    /// assert_eq!(Path::parse("data/name/").unwrap(), path);
    /// ```
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let components: Vec<String> = s
            .split('/')
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect();

        for (i, component) in components.iter().enumerate() {
            Self::validate_component(component, i)?;
        }

        Ok(Path { components })
    }

    /// A single-component path naming a top-level field.
    pub fn field(name: &str) -> Result<Self, PathError> {
        Self::validate_component(name, 0)?;
        Ok(Path {
            components: vec![name.to_string()],
        })
    }

    fn validate_component(component: &str, position: usize) -> Result<(), PathError> {
        let mut chars = component.chars();
        let Some(first) = chars.next() else {
            return Err(PathError::InvalidComponent {
                component: component.to_string(),
                position,
                message: "empty component".to_string(),
            });
        };

        if component.chars().all(|c| c.is_ascii_digit()) {
            return Ok(());
        }

        let valid_start = unicode_ident::is_xid_start(first) || first == '_';
        if !valid_start {
            return Err(PathError::InvalidComponent {
                component: component.to_string(),
                position,
                message: "must start with a letter or underscore".to_string(),
            });
        }

        for c in chars {
            if !unicode_ident::is_xid_continue(c) {
                return Err(PathError::InvalidComponent {
                    component: component.to_string(),
                    position,
                    message: format!("invalid character '{}' in identifier", c),
                });
            }
        }

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.components.iter()
    }

    /// Split into the first component and the path below it.
    pub fn split_first(&self) -> Option<(&str, Path)> {
        let (first, rest) = self.components.split_first()?;
        Some((
            first.as_str(),
            Path {
                components: rest.to_vec(),
            },
        ))
    }

    /// Split into the parent path and the last component.
    pub(crate) fn split_last(&self) -> Option<(Path, &str)> {
        let (last, parent) = self.components.split_last()?;
        Some((
            Path {
                components: parent.to_vec(),
            },
            last.as_str(),
        ))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl std::ops::Index<usize> for Path {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.components[i]
    }
}

/// Build a path from a literal.
///
/// ```rust
/// use class_state_snapshot::path;
///
/// let p = path!("data/name");
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! path {
    ($s:expr) => {
        $crate::Path::parse($s).expect("invalid path literal")
    };
}
