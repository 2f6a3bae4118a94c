//! Type-erased capture of a call's positional arguments.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

/// One recorded argument.
///
/// The value is kept behind an `Arc` so snapshots of the ledger share it
/// rather than requiring `Clone` from every argument type. The type name and
/// `Debug` rendering are captured at record time for diagnostics.
#[derive(Clone)]
pub struct Param {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    debug: String,
}

impl Param {
    /// Captures a value.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        Self {
            debug: format!("{value:?}"),
            type_name: type_name::<T>(),
            value: Arc::new(value),
        }
    }

    /// Borrows the value if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if the value has type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Name of the captured type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// `Debug` rendering captured at record time.
    #[must_use]
    pub fn debug(&self) -> &str {
        &self.debug
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug)
    }
}

/// Ordered arguments of one recorded call.
///
/// Build with [`params!`](crate::params):
///
/// ```rust
/// use testkit_suspend::params;
///
/// let params = params!["P", 3];
/// assert_eq!(params.len(), 2);
/// assert_eq!(params.get::<&str>(0), Some(&"P"));
/// assert_eq!(params.cloned::<i32>(1), Some(3));
/// assert_eq!(params.get::<u64>(1), None);
/// ```
#[derive(Clone, Default)]
pub struct Params(Vec<Param>);

impl Params {
    /// An empty argument list.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends an argument.
    #[must_use]
    pub fn with<T>(mut self, value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        self.0.push(Param::new(value));
        self
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for a call with no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The argument at `position`, untyped.
    #[must_use]
    pub fn param(&self, position: usize) -> Option<&Param> {
        self.0.get(position)
    }

    /// Borrows the argument at `position` if it exists and has type `T`.
    #[must_use]
    pub fn get<T: Any>(&self, position: usize) -> Option<&T> {
        self.0.get(position)?.downcast_ref::<T>()
    }

    /// Clones the argument at `position` if it exists and has type `T`.
    #[must_use]
    pub fn cloned<T: Any + Clone>(&self, position: usize) -> Option<T> {
        self.get::<T>(position).cloned()
    }

    /// Iterates over the arguments in call order.
    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.0.iter()
    }

    /// `Debug` renderings of every argument, in call order.
    #[must_use]
    pub fn debug_strings(&self) -> Vec<&str> {
        self.0.iter().map(Param::debug).collect()
    }
}

impl From<Vec<Param>> for Params {
    fn from(params: Vec<Param>) -> Self {
        Self(params)
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.0).finish()
    }
}

/// Builds [`Params`](crate::ledger::Params) from a list of values.
///
/// Each value must be `Any + Send + Sync + Debug`.
///
/// ```rust
/// use testkit_suspend::params;
///
/// let params = params![String::from("id-7"), 42u32, true];
/// assert_eq!(format!("{params:?}"), r#"["id-7", 42, true]"#);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::ledger::Params::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::ledger::Params::from(::std::vec![$($crate::ledger::Param::new($value)),+])
    };
}
