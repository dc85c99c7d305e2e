//! Type argument inference by structural unification.

use rustc_hash::FxHashMap;

use crate::{Idx, Pool, TypeData};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnifyError {
    /// A type parameter was bound to two different types.
    Conflict { param: Idx, first: Idx, second: Idx },
    /// The argument's shape doesn't match the parameter type.
    Mismatch,
}

impl Pool {
    /// Unify parameter type `param` (which may mention type parameters) with
    /// argument type `arg`, extending `subst`.
    ///
    /// Parts of `param` without type parameters are not checked here; the
    /// caller checks assignability once the substitution is complete.
    pub fn unify(
        &self,
        param: Idx,
        arg: Idx,
        subst: &mut FxHashMap<Idx, Idx>,
    ) -> Result<(), UnifyError> {
        if !self.has_type_params(param) {
            return Ok(());
        }
        if self.is_type_param(param) {
            return match subst.get(&param) {
                Some(&bound) if bound != arg => Err(UnifyError::Conflict {
                    param,
                    first: bound,
                    second: arg,
                }),
                Some(_) => Ok(()),
                None => {
                    subst.insert(param, arg);
                    Ok(())
                }
            };
        }

        // Generic instance against an instance of the same declaration.
        if let (Some(p), Some(a)) = (self.named_info(param), self.named_info(arg)) {
            return match (&p.origin, &a.origin) {
                (Some(po), Some(ao)) if po.generic == ao.generic => {
                    self.unify_all(&po.args, &ao.args, subst)
                }
                _ => Err(UnifyError::Mismatch),
            };
        }

        // An unnamed composite parameter matches a named argument's structure.
        let arg = self.underlying(arg);
        match (self.data(param), self.data(arg)) {
            (TypeData::Pointer(p), TypeData::Pointer(a)) | (TypeData::Slice(p), TypeData::Slice(a)) => {
                self.unify(*p, *a, subst)
            }
            (
                TypeData::Array { len: pl, elem: p },
                TypeData::Array { len: al, elem: a },
            ) if pl == al => self.unify(*p, *a, subst),
            (
                TypeData::Map { key: pk, value: pv },
                TypeData::Map { key: ak, value: av },
            ) => {
                self.unify(*pk, *ak, subst)?;
                self.unify(*pv, *av, subst)
            }
            (TypeData::Chan { elem: p, .. }, TypeData::Chan { elem: a, .. }) => {
                self.unify(*p, *a, subst)
            }
            (TypeData::Func(p), TypeData::Func(a))
                if p.params.len() == a.params.len()
                    && p.results.len() == a.results.len()
                    && p.variadic == a.variadic =>
            {
                self.unify_all(&p.params, &a.params, subst)?;
                self.unify_all(&p.results, &a.results, subst)
            }
            (TypeData::Struct(p), TypeData::Struct(a)) if p.len() == a.len() => {
                for (pf, af) in p.iter().zip(a.iter()) {
                    if pf.name != af.name {
                        return Err(UnifyError::Mismatch);
                    }
                    self.unify(pf.ty, af.ty, subst)?;
                }
                Ok(())
            }
            _ => Err(UnifyError::Mismatch),
        }
    }

    fn unify_all(
        &self,
        params: &[Idx],
        args: &[Idx],
        subst: &mut FxHashMap<Idx, Idx>,
    ) -> Result<(), UnifyError> {
        for (&p, &a) in params.iter().zip(args) {
            self.unify(p, a, subst)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use rustc_hash::FxHashMap;
    use terp_ir::{ChanDir, SharedInterner};

    use super::UnifyError;
    use crate::{Idx, Origin, Pool};

    fn pool() -> Pool {
        Pool::new(SharedInterner::new())
    }

    #[test]
    fn binds_through_composites() {
        let mut pool = pool();
        let t = pool.interner().intern("T");
        let k = pool.interner().intern("K");
        let tp = pool.new_type_param(t, 0);
        let kp = pool.new_type_param(k, 1);
        let elems = pool.slice(tp);
        let param = pool.map(kp, elems);
        let floats = pool.slice(Idx::FLOAT64);
        let arg = pool.map(Idx::STRING, floats);

        let mut subst = FxHashMap::default();
        pool.unify(param, arg, &mut subst).unwrap();
        assert_eq!(subst.get(&tp), Some(&Idx::FLOAT64));
        assert_eq!(subst.get(&kp), Some(&Idx::STRING));
    }

    #[test]
    fn conflicting_bindings() {
        let mut pool = pool();
        let t = pool.interner().intern("T");
        let tp = pool.new_type_param(t, 0);
        let mut subst = FxHashMap::default();
        pool.unify(tp, Idx::INT, &mut subst).unwrap();
        assert_eq!(
            pool.unify(tp, Idx::STRING, &mut subst),
            Err(UnifyError::Conflict {
                param: tp,
                first: Idx::INT,
                second: Idx::STRING,
            })
        );
    }

    #[test]
    fn named_argument_matches_unnamed_parameter() {
        let mut pool = pool();
        let t = pool.interner().intern("T");
        let tp = pool.new_type_param(t, 0);
        let param = pool.slice(tp);
        let ints = pool.slice(Idx::INT);
        let name = pool.interner().intern("Ints");
        let named = pool.new_named(name, None);
        pool.set_underlying(named, ints);

        let mut subst = FxHashMap::default();
        pool.unify(param, named, &mut subst).unwrap();
        assert_eq!(subst.get(&tp), Some(&Idx::INT));
    }

    #[test]
    fn generic_instances_unify_arguments() {
        let mut pool = pool();
        let t = pool.interner().intern("T");
        let tp = pool.new_type_param(t, 0);
        let list = pool.interner().intern("List");
        let open = pool.new_named(
            list,
            Some(Origin {
                generic: 7,
                args: vec![tp],
            }),
        );
        let closed = pool.new_named(
            list,
            Some(Origin {
                generic: 7,
                args: vec![Idx::BOOL],
            }),
        );
        let mut subst = FxHashMap::default();
        pool.unify(open, closed, &mut subst).unwrap();
        assert_eq!(subst.get(&tp), Some(&Idx::BOOL));
    }

    #[test]
    fn shape_mismatch() {
        let mut pool = pool();
        let t = pool.interner().intern("T");
        let tp = pool.new_type_param(t, 0);
        let param = pool.chan(ChanDir::Both, tp);
        let mut subst = FxHashMap::default();
        assert_eq!(
            pool.unify(param, Idx::INT, &mut subst),
            Err(UnifyError::Mismatch)
        );
    }
}
