// check.rs — Reference check over a whole unit
//
// Optional semantic pass run after parsing. Verifies that every name used
// by a call or reference exists in its scope:
//   - the callable a call statement invokes;
//   - each binding id is an input of that callable;
//   - `using (...)` ids are known modifiers;
//   - `CALL.OUT` names a call of the same pipeline and one of its outputs;
//   - `self.IN` names an input of the enclosing pipeline;
//   - return ids are outputs of the pipeline.
// On success each pipeline's `scope` maps call ids to callable ids.
//
// Preconditions: `ast` passed the structural rules (`validate`).
// Postconditions: Ok means every reference resolves; scopes are filled.
// Failure modes: `UnresolvedReference` for the first failure, in
//   declaration order.
// Side effects: writes `Pipeline::scope`.

use indexmap::IndexMap;

use crate::ast::*;
use crate::diag::{Error, Result};
use crate::intern::{Sym, DEFAULT_ID};

/// Ids accepted in a call's `using (...)` block.
const MODIFIER_IDS: [&str; 4] = ["disabled", "local", "preflight", "volatile"];

/// Check `ast` and fill in pipeline scopes.
pub fn check_ast(ast: &mut Ast) -> Result<()> {
    // Resolve with shared borrows first, then store.
    let mut scopes = Vec::new();
    {
        let checker = Checker { ast: &*ast };
        for callable in ast.callables.values() {
            if let Callable::Pipeline(p) = callable {
                scopes.push((p.id, checker.pipeline(p)?));
            }
        }
        if let Some(call) = &ast.call {
            checker.call(call, None)?;
        }
    }
    for (id, scope) in scopes {
        if let Some(Callable::Pipeline(p)) = ast.callables.get_mut(&id) {
            p.scope = scope;
        }
    }
    log::debug!("reference check passed");
    Ok(())
}

struct Checker<'a> {
    ast: &'a Ast,
}

/// What a reference can see.
struct Scope<'p> {
    pipeline: &'p Pipeline,
    calls: IndexMap<Sym, &'p Callable>,
}

impl<'a> Checker<'a> {
    fn unresolved(&self, node: &AstNode, reference: String) -> Error {
        Error::UnresolvedReference {
            file: self.ast.files.name(node.loc.file).to_string(),
            line: node.loc.line,
            reference,
        }
    }

    fn callee(&self, call: &CallStm) -> Result<&'a Callable> {
        self.ast
            .callables
            .get(&call.dec_id)
            .ok_or_else(|| self.unresolved(&call.node, self.ast.name(call.dec_id).to_string()))
    }

    fn pipeline(&self, pipeline: &Pipeline) -> Result<IndexMap<Sym, Sym>> {
        let mut calls = IndexMap::new();
        for call in &pipeline.calls {
            calls.insert(call.id, self.callee(call)?);
        }
        let scope = Scope { pipeline, calls };

        for call in &pipeline.calls {
            self.call(call, Some(&scope))?;
        }
        for b in &pipeline.ret.bindings.list {
            if !pipeline.out_params.iter().any(|p| p.id == b.id) {
                return Err(self.unresolved(&b.node, format!("return.{}", self.ast.name(b.id))));
            }
            self.exp(&b.exp, Some(&scope))?;
        }
        if let Some(retain) = &pipeline.retain {
            for r in &retain.refs {
                self.ref_exp(r, Some(&scope))?;
            }
        }
        Ok(pipeline.calls.iter().map(|c| (c.id, c.dec_id)).collect())
    }

    fn call(&self, call: &CallStm, scope: Option<&Scope<'_>>) -> Result<()> {
        let ast = self.ast;
        let callee = self.callee(call)?;
        for b in &call.bindings.list {
            if !callee.in_params().iter().any(|p| p.id == b.id) {
                return Err(self.unresolved(
                    &b.node,
                    format!("{}.{}", ast.name(call.id), ast.name(b.id)),
                ));
            }
            self.exp(&b.exp, scope)?;
        }
        if let Some(mods) = &call.modifiers.bindings {
            for b in &mods.list {
                if !MODIFIER_IDS.contains(&ast.name(b.id)) {
                    return Err(self.unresolved(&b.node, ast.name(b.id).to_string()));
                }
                self.exp(&b.exp, scope)?;
            }
        }
        Ok(())
    }

    fn exp(&self, exp: &Exp, scope: Option<&Scope<'_>>) -> Result<()> {
        let mut first = None;
        exp.for_each_ref(&mut |r| {
            if first.is_none() {
                first = self.ref_exp(r, scope).err();
            }
        });
        first.map_or(Ok(()), Err)
    }

    fn ref_exp(&self, r: &RefExp, scope: Option<&Scope<'_>>) -> Result<()> {
        let ast = self.ast;
        let resolved = match (r.target, scope) {
            (RefTarget::SelfInput { id }, Some(scope)) => {
                scope.pipeline.in_params.iter().any(|p| p.id == id)
            }
            (RefTarget::Call { id, output_id }, Some(scope)) => match scope.calls.get(&id) {
                Some(callee) => {
                    ast.name(output_id) == DEFAULT_ID
                        || callee.out_params().iter().any(|p| p.id == output_id)
                }
                None => false,
            },
            // A top-level call has nothing in scope to reference.
            (_, None) => false,
        };
        if resolved {
            return Ok(());
        }
        let text = match r.target {
            RefTarget::SelfInput { id } => format!("self.{}", ast.name(id)),
            RefTarget::Call { id, output_id } if ast.name(output_id) == DEFAULT_ID => {
                ast.name(id).to_string()
            }
            RefTarget::Call { id, output_id } => {
                format!("{}.{}", ast.name(id), ast.name(output_id))
            }
        };
        Err(self.unresolved(&r.node, text))
    }
}
