//! Presence-aware mapping between config structs and remote models
//!
//! A [`SparseMapper`] is a table of field bindings for one resource type.
//! `build` turns a config into a request and `convert` / `apply_read` turn a
//! response back into config shape. In both directions a value is copied only
//! when it is present on the source side, so an unset config field is never
//! sent and an omitted response field never clobbers a configured value.
//!
//! ```ignore
//! let mapper = SparseMapper::<ListenerConfig, ListenerModel>::new()
//!     .field(
//!         ("protocol", "Protocol"),
//!         |c| &c.protocol,
//!         |c| &mut c.protocol,
//!         |r| &r.protocol,
//!         |r| &mut r.protocol,
//!         Transform::plain(),
//!     )
//!     .field(
//!         ("port", "ProtocolPort"),
//!         |c| &c.port,
//!         |c| &mut c.port,
//!         |r| &r.protocol_port,
//!         |r| &mut r.protocol_port,
//!         Transform::optional(),
//!     );
//! ```

use crate::error::{EngineError, Result};
use std::collections::{BTreeMap, HashMap};

/// Whether a remote value counts as "returned".
///
/// Plain remote fields use their zero value to mean "absent".
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl<T> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        *self
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Presence for HashMap<K, V> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Presence for BTreeMap<K, V> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! zero_is_absent {
    ($($ty:ty),*) => {
        $(
            impl Presence for $ty {
                fn is_present(&self) -> bool {
                    *self != 0
                }
            }
        )*
    };
}

zero_is_absent!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl Presence for f64 {
    fn is_present(&self) -> bool {
        *self != 0.0
    }
}

/// Value conversion between a config field of type `T` and a remote field of
/// type `U`, with the presence predicates for both sides.
pub struct Transform<T, U> {
    to_remote: fn(&T) -> std::result::Result<U, String>,
    to_config: fn(&U) -> Option<T>,
    config_present: fn(&T) -> bool,
    remote_present: fn(&U) -> bool,
}

fn always<T>(_: &T) -> bool {
    true
}

impl<T: Clone + Presence> Transform<T, T> {
    /// Same type on both sides; the remote field uses its zero value for
    /// "absent".
    pub fn plain() -> Self {
        Self {
            to_remote: |t| Ok(t.clone()),
            to_config: |u| Some(u.clone()),
            config_present: always,
            remote_present: T::is_present,
        }
    }
}

impl<T: Clone> Transform<T, Option<T>> {
    /// The remote field is itself optional (a pointer field in the wire
    /// model), so configured zero values survive the trip.
    pub fn optional() -> Self {
        Self {
            to_remote: |t| Ok(Some(t.clone())),
            to_config: |u| u.clone(),
            config_present: always,
            remote_present: Option::is_some,
        }
    }
}

impl<T, U: Presence> Transform<T, U> {
    /// Custom conversion. `to_remote` may reject a value; `to_config` returns
    /// `None` for a remote value it cannot represent.
    pub fn new(
        to_remote: fn(&T) -> std::result::Result<U, String>,
        to_config: fn(&U) -> Option<T>,
    ) -> Self {
        Self {
            to_remote,
            to_config,
            config_present: always,
            remote_present: U::is_present,
        }
    }
}

impl<T, U> Transform<T, U> {
    /// Narrow config-side presence beyond `Option::is_some`
    /// (e.g. treat an empty string as unset).
    pub fn present_if(mut self, predicate: fn(&T) -> bool) -> Self {
        self.config_present = predicate;
        self
    }

    /// Override how presence of the remote value is decided
    pub fn remote_present_if(mut self, predicate: fn(&U) -> bool) -> Self {
        self.remote_present = predicate;
        self
    }
}

/// Allowed number of elements in a nested block list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Any,
    Exactly(usize),
    AtMost(usize),
}

impl Cardinality {
    fn admits(&self, len: usize) -> bool {
        match *self {
            Cardinality::Any => true,
            Cardinality::Exactly(n) => len == n,
            Cardinality::AtMost(n) => len <= n,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::Any => write!(f, "any number of"),
            Cardinality::Exactly(n) => write!(f, "exactly {}", n),
            Cardinality::AtMost(n) => write!(f, "at most {}", n),
        }
    }
}

trait Binding<C, R>: Send + Sync {
    fn config_path(&self) -> &'static str;

    fn is_configured(&self, config: &C) -> bool;

    fn changed(&self, previous: &C, desired: &C) -> bool;

    fn build(&self, config: &C, remote: &mut R) -> Result<()>;

    fn convert(&self, remote: &R, config: &mut C);
}

struct Field<C, R, T, U> {
    config_path: &'static str,
    remote_path: &'static str,
    config: fn(&C) -> &Option<T>,
    config_mut: fn(&mut C) -> &mut Option<T>,
    remote: fn(&R) -> &U,
    remote_mut: fn(&mut R) -> &mut U,
    transform: Transform<T, U>,
}

impl<C, R, T: PartialEq, U> Binding<C, R> for Field<C, R, T, U> {
    fn config_path(&self) -> &'static str {
        self.config_path
    }

    fn is_configured(&self, config: &C) -> bool {
        (self.config)(config)
            .as_ref()
            .is_some_and(self.transform.config_present)
    }

    fn changed(&self, previous: &C, desired: &C) -> bool {
        self.is_configured(desired) && (self.config)(previous) != (self.config)(desired)
    }

    fn build(&self, config: &C, remote: &mut R) -> Result<()> {
        let Some(value) = (self.config)(config).as_ref() else {
            return Ok(());
        };
        if !(self.transform.config_present)(value) {
            return Ok(());
        }
        let converted = (self.transform.to_remote)(value).map_err(|message| {
            EngineError::validation(self.config_path, format!("{} ({})", message, self.remote_path))
        })?;
        *(self.remote_mut)(remote) = converted;
        Ok(())
    }

    fn convert(&self, remote: &R, config: &mut C) {
        let value = (self.remote)(remote);
        if !(self.transform.remote_present)(value) {
            return;
        }
        if let Some(converted) = (self.transform.to_config)(value) {
            *(self.config_mut)(config) = Some(converted);
        }
    }
}

struct Block<C, R, CC, RR> {
    config_path: &'static str,
    config: fn(&C) -> &Vec<CC>,
    config_mut: fn(&mut C) -> &mut Vec<CC>,
    remote: fn(&R) -> &Option<RR>,
    remote_mut: fn(&mut R) -> &mut Option<RR>,
    inner: SparseMapper<CC, RR>,
}

impl<C, R, CC, RR> Binding<C, R> for Block<C, R, CC, RR>
where
    CC: Default + Clone + PartialEq + 'static,
    RR: Default + 'static,
{
    fn config_path(&self) -> &'static str {
        self.config_path
    }

    fn is_configured(&self, config: &C) -> bool {
        !(self.config)(config).is_empty()
    }

    fn changed(&self, previous: &C, desired: &C) -> bool {
        self.is_configured(desired) && (self.config)(previous) != (self.config)(desired)
    }

    fn build(&self, config: &C, remote: &mut R) -> Result<()> {
        let blocks = (self.config)(config);
        match blocks.len() {
            0 => Ok(()),
            1 => {
                let built = self
                    .inner
                    .build(&blocks[0])
                    .map_err(|e| nest(e, self.config_path, 0))?;
                *(self.remote_mut)(remote) = Some(built);
                Ok(())
            }
            n => Err(EngineError::validation(
                self.config_path,
                format!("expected exactly 1 block, found {}", n),
            )),
        }
    }

    fn convert(&self, remote: &R, config: &mut C) {
        let Some(model) = (self.remote)(remote) else {
            return;
        };
        let blocks = (self.config_mut)(config);
        let base = if blocks.len() == 1 {
            blocks.remove(0)
        } else {
            CC::default()
        };
        *blocks = vec![self.inner.apply_read(base, model)];
    }
}

struct BlockList<C, R, CC, RR> {
    config_path: &'static str,
    config: fn(&C) -> &Vec<CC>,
    config_mut: fn(&mut C) -> &mut Vec<CC>,
    remote: fn(&R) -> &Vec<RR>,
    remote_mut: fn(&mut R) -> &mut Vec<RR>,
    cardinality: Cardinality,
    inner: SparseMapper<CC, RR>,
}

impl<C, R, CC, RR> Binding<C, R> for BlockList<C, R, CC, RR>
where
    CC: Default + Clone + PartialEq + 'static,
    RR: Default + 'static,
{
    fn config_path(&self) -> &'static str {
        self.config_path
    }

    fn is_configured(&self, config: &C) -> bool {
        !(self.config)(config).is_empty()
    }

    fn changed(&self, previous: &C, desired: &C) -> bool {
        self.is_configured(desired) && (self.config)(previous) != (self.config)(desired)
    }

    fn build(&self, config: &C, remote: &mut R) -> Result<()> {
        let blocks = (self.config)(config);
        if blocks.is_empty() {
            return Ok(());
        }
        if !self.cardinality.admits(blocks.len()) {
            return Err(EngineError::validation(
                self.config_path,
                format!("expected {} blocks, found {}", self.cardinality, blocks.len()),
            ));
        }
        let built = blocks
            .iter()
            .enumerate()
            .map(|(i, block)| self.inner.build(block).map_err(|e| nest(e, self.config_path, i)))
            .collect::<Result<Vec<_>>>()?;
        *(self.remote_mut)(remote) = built;
        Ok(())
    }

    fn convert(&self, remote: &R, config: &mut C) {
        let models = (self.remote)(remote);
        if models.is_empty() {
            return;
        }
        let previous = std::mem::take((self.config_mut)(config));
        let converted = models
            .iter()
            .enumerate()
            .map(|(i, model)| {
                let base = previous.get(i).cloned().unwrap_or_default();
                self.inner.apply_read(base, model)
            })
            .collect();
        *(self.config_mut)(config) = converted;
    }
}

fn nest(err: EngineError, block: &str, index: usize) -> EngineError {
    match err {
        EngineError::Validation { field, message } => EngineError::Validation {
            field: format!("{}.{}.{}", block, index, field),
            message,
        },
        other => other,
    }
}

/// Bidirectional field mapping table for one config/remote pair
pub struct SparseMapper<C, R> {
    bindings: Vec<Box<dyn Binding<C, R>>>,
    exclusive: Vec<Vec<&'static str>>,
}

impl<C: 'static, R: 'static> Default for SparseMapper<C, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static, R: 'static> SparseMapper<C, R> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            exclusive: Vec::new(),
        }
    }

    /// Bind an optional config field to a remote field.
    ///
    /// `path` is `(config_path, remote_path)`; the config path is what
    /// validation errors report.
    pub fn field<T, U>(
        mut self,
        path: (&'static str, &'static str),
        config: fn(&C) -> &Option<T>,
        config_mut: fn(&mut C) -> &mut Option<T>,
        remote: fn(&R) -> &U,
        remote_mut: fn(&mut R) -> &mut U,
        transform: Transform<T, U>,
    ) -> Self
    where
        T: PartialEq + 'static,
        U: 'static,
    {
        self.bindings.push(Box::new(Field {
            config_path: path.0,
            remote_path: path.1,
            config,
            config_mut,
            remote,
            remote_mut,
            transform,
        }));
        self
    }

    /// Bind a singleton nested block (a config list that must hold zero or
    /// exactly one element) to an optional remote sub-model.
    pub fn block<CC, RR>(
        mut self,
        config_path: &'static str,
        config: fn(&C) -> &Vec<CC>,
        config_mut: fn(&mut C) -> &mut Vec<CC>,
        remote: fn(&R) -> &Option<RR>,
        remote_mut: fn(&mut R) -> &mut Option<RR>,
        inner: SparseMapper<CC, RR>,
    ) -> Self
    where
        CC: Default + Clone + PartialEq + 'static,
        RR: Default + 'static,
    {
        self.bindings.push(Box::new(Block {
            config_path,
            config,
            config_mut,
            remote,
            remote_mut,
            inner,
        }));
        self
    }

    /// Bind a repeated nested block to a remote list of sub-models
    #[allow(clippy::too_many_arguments)]
    pub fn block_list<CC, RR>(
        mut self,
        config_path: &'static str,
        config: fn(&C) -> &Vec<CC>,
        config_mut: fn(&mut C) -> &mut Vec<CC>,
        remote: fn(&R) -> &Vec<RR>,
        remote_mut: fn(&mut R) -> &mut Vec<RR>,
        cardinality: Cardinality,
        inner: SparseMapper<CC, RR>,
    ) -> Self
    where
        CC: Default + Clone + PartialEq + 'static,
        RR: Default + 'static,
    {
        self.bindings.push(Box::new(BlockList {
            config_path,
            config,
            config_mut,
            remote,
            remote_mut,
            cardinality,
            inner,
        }));
        self
    }

    /// Declare config paths of which at most one may be set
    pub fn exclusive(mut self, paths: &[&'static str]) -> Self {
        self.exclusive.push(paths.to_vec());
        self
    }

    /// Config paths that are present in `config`, in binding order
    pub fn configured_paths(&self, config: &C) -> Vec<&'static str> {
        self.bindings
            .iter()
            .filter(|b| b.is_configured(config))
            .map(|b| b.config_path())
            .collect()
    }

    fn check_exclusive(&self, config: &C) -> Result<()> {
        let configured = self.configured_paths(config);
        for group in &self.exclusive {
            let set: Vec<&str> = group
                .iter()
                .copied()
                .filter(|p| configured.contains(p))
                .collect();
            if set.len() > 1 {
                return Err(EngineError::validation(
                    set[0],
                    format!("conflicts with {}", set[1..].join(", ")),
                ));
            }
        }
        Ok(())
    }

    /// Copy every present config field into `remote`
    pub fn build_into(&self, config: &C, remote: &mut R) -> Result<()> {
        self.check_exclusive(config)?;
        for binding in &self.bindings {
            binding.build(config, remote)?;
        }
        Ok(())
    }

    pub fn build(&self, config: &C) -> Result<R>
    where
        R: Default,
    {
        let mut remote = R::default();
        self.build_into(config, &mut remote)?;
        Ok(remote)
    }

    /// Build a request carrying only the fields that differ between
    /// `previous` and `desired`. Returns `None` when nothing changed.
    pub fn build_changes(&self, previous: &C, desired: &C) -> Result<Option<R>>
    where
        R: Default,
    {
        self.check_exclusive(desired)?;
        let mut remote = R::default();
        let mut changed = false;
        for binding in &self.bindings {
            if binding.changed(previous, desired) {
                binding.build(desired, &mut remote)?;
                changed = true;
            }
        }
        Ok(changed.then_some(remote))
    }

    /// Copy every present remote field into `config`
    pub fn convert_into(&self, remote: &R, config: &mut C) {
        for binding in &self.bindings {
            binding.convert(remote, config);
        }
    }

    pub fn convert(&self, remote: &R) -> C
    where
        C: Default,
    {
        let mut config = C::default();
        self.convert_into(remote, &mut config);
        config
    }

    /// Overlay a response onto the previously known config
    pub fn apply_read(&self, mut config: C, remote: &R) -> C {
        self.convert_into(remote, &mut config);
        config
    }
}

/// Bind `config.$c` to `remote.$r` on a [`SparseMapper`] without spelling
/// out the four accessors.
///
/// ```ignore
/// let mapper = bind_field!(
///     SparseMapper::<PoolConfig, PoolModel>::new(),
///     name => name,
///     Transform::plain()
/// );
/// ```
#[macro_export]
macro_rules! bind_field {
    ($mapper:expr, $c:ident => $($r:ident).+, $transform:expr) => {
        $mapper.field(
            (stringify!($c), stringify!($($r).+)),
            |c| &c.$c,
            |c| &mut c.$c,
            |r| &r.$($r).+,
            |r| &mut r.$($r).+,
            $transform,
        )
    };
}
