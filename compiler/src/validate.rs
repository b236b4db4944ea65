// validate.rs — Structural rules checked as each file finishes parsing
//
// Rules that a context-free grammar cannot express:
//   - parameter ids are unique within each parameter list;
//   - an unnamed (`default`) parameter must be the only member of its list;
//   - call ids are unique within a pipeline;
//   - binding ids are unique within each binding list.
//
// Cross-file uniqueness of callable ids is enforced when files are merged
// into a unit (`frontend::merge`).
//
// Preconditions: `parsed` came from `parser::parse` with `interner`.
// Postconditions: Ok means the file obeys every rule above.
// Failure modes: the first violation, in source order.
// Side effects: none.

use std::collections::HashSet;

use crate::ast::*;
use crate::diag::{Error, Result};
use crate::intern::{Interner, Sym, DEFAULT_ID};

/// Check one parsed file.
pub fn check_file(parsed: &ParsedFile, file_name: &str, interner: &Interner) -> Result<()> {
    let v = Validator {
        file_name,
        interner,
    };
    for dec in &parsed.decs {
        match dec {
            Dec::UserType(_) => {}
            Dec::Stage(stage) => v.stage(stage)?,
            Dec::Pipeline(pipeline) => v.pipeline(pipeline)?,
        }
    }
    if let Some(call) = &parsed.call {
        v.call(call)?;
    }
    Ok(())
}

struct Validator<'a> {
    file_name: &'a str,
    interner: &'a Interner,
}

impl Validator<'_> {
    fn stage(&self, stage: &Stage) -> Result<()> {
        self.params(&stage.in_params, &stage.out_params)?;
        if let Some(split) = &stage.split {
            self.params(&split.in_params, &split.out_params)?;
        }
        if let Some(retain) = &stage.retain {
            self.unique("retained output", retain.params.iter().map(|p| (p.id, &p.node)))?;
        }
        Ok(())
    }

    fn pipeline(&self, pipeline: &Pipeline) -> Result<()> {
        self.params(&pipeline.in_params, &pipeline.out_params)?;
        self.unique("call", pipeline.calls.iter().map(|c| (c.id, &c.node)))?;
        for call in &pipeline.calls {
            self.call(call)?;
        }
        self.bindings(&pipeline.ret.bindings)
    }

    fn call(&self, call: &CallStm) -> Result<()> {
        self.bindings(&call.bindings)?;
        if let Some(bindings) = &call.modifiers.bindings {
            self.bindings(bindings)?;
        }
        Ok(())
    }

    fn bindings(&self, bindings: &BindStms) -> Result<()> {
        self.unique("binding", bindings.list.iter().map(|b| (b.id, &b.node)))
    }

    fn params(&self, ins: &[InParam], outs: &[OutParam]) -> Result<()> {
        self.param_list("input", ins.iter().map(|p| (p.id, &p.node)))?;
        self.param_list("output", outs.iter().map(|p| (p.id, &p.node)))
    }

    fn param_list<'n>(
        &self,
        kind: &'static str,
        list: impl Iterator<Item = (Sym, &'n AstNode)> + Clone,
    ) -> Result<()> {
        let len = list.clone().count();
        if len > 1 {
            if let Some((_, node)) = list
                .clone()
                .find(|(id, _)| self.interner.resolve(*id) == DEFAULT_ID)
            {
                return Err(Error::Parse {
                    file: self.file_name.to_string(),
                    line: node.loc.line,
                    expected: format!("a named {kind} parameter"),
                    found: format!("unnamed {kind} among {len}"),
                });
            }
        }
        self.unique(kind, list)
    }

    fn unique<'n>(
        &self,
        kind: &'static str,
        items: impl Iterator<Item = (Sym, &'n AstNode)>,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for (id, node) in items {
            if !seen.insert(id) {
                return Err(Error::DuplicateIdentifier {
                    file: self.file_name.to_string(),
                    line: node.loc.line,
                    kind,
                    id: self.interner.resolve(id).to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::source::FileId;

    fn validate(source: &str) -> Result<()> {
        let mut interner = Interner::new();
        let parsed = parse(source, FileId(0), "v.mro", &mut interner)
            .unwrap_or_else(|e| panic!("unexpected parse error: {e}"));
        check_file(&parsed, "v.mro", &interner)
    }

    #[test]
    fn valid_file_passes() {
        validate(
            "stage A(\n    in  int x,\n    out int,\n    src py \"a\",\n)\n\
             pipeline P(\n    in int x,\n    out int y,\n)\n{\n    call A(\n        x = self.x,\n    )\n\n    return (\n        y = A,\n    )\n}\n",
        )
        .unwrap_or_else(|e| panic!("unexpected error: {e}"));
    }

    #[test]
    fn duplicate_param() {
        let err = validate("stage A(\n    in int x,\n    in int x,\n    src py \"a\",\n)\n").unwrap_err();
        match err {
            Error::DuplicateIdentifier { line, kind, id, .. } => {
                assert_eq!(line, 3);
                assert_eq!(kind, "input");
                assert_eq!(id, "x");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn same_name_in_and_out_is_allowed() {
        validate("stage A(\n    in int x,\n    out int x,\n    src py \"a\",\n)\n")
            .unwrap_or_else(|e| panic!("unexpected error: {e}"));
    }

    #[test]
    fn unnamed_output_must_be_alone() {
        let err = validate("stage A(\n    out int,\n    out int y,\n    src py \"a\",\n)\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }), "{err}");
    }

    #[test]
    fn duplicate_call_in_pipeline() {
        let err = validate(
            "pipeline P()\n{\n    call A()\n\n    call A()\n\n    return ()\n}\n",
        )
        .unwrap_err();
        assert!(
            matches!(&err, Error::DuplicateIdentifier { line: 5, kind: "call", .. }),
            "{err}"
        );
    }

    #[test]
    fn duplicate_binding() {
        let err = validate("call P(\n    a = 1,\n    a = 2,\n)\n").unwrap_err();
        assert_eq!(err.to_string(), "v.mro:3: duplicate binding 'a'");
    }
}
