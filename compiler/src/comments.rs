// comments.rs — Positional comment attachment
//
// Comments never reach the grammar. After a file parses, every comment line
// is handed to the first node that starts below it, where "node" means one
// of the constructs the formatter prints comments for (the anchors).
//
// Of the lines a node claims, the run of consecutive lines ending right
// above the node becomes its `comments`; anything earlier becomes its
// `scope_comments` header. Comments below the last anchor of a file stay
// pooled in `ParsedFile::comments`.
//
// Preconditions: `parsed.comments` holds every comment of the file, in line order.
// Postconditions: each comment is either attached to exactly one node or pooled.
// Failure modes: none.
// Side effects: none.

use crate::ast::*;

/// Attach the pooled comments of one parsed file to its nodes.
pub fn attach(parsed: &mut ParsedFile) {
    let pool = std::mem::take(&mut parsed.comments);
    if pool.is_empty() {
        return;
    }

    let mut anchors: Vec<&mut AstNode> = Vec::new();
    for include in &mut parsed.includes {
        anchors.push(&mut include.node);
    }
    for dec in &mut parsed.decs {
        push_dec(dec, &mut anchors);
    }
    if let Some(call) = &mut parsed.call {
        push_call(call, &mut anchors);
    }
    // Stable: nodes sharing a line keep traversal order, outermost first.
    anchors.sort_by_key(|node| node.loc.line);

    let mut comments = pool.into_iter().peekable();
    let mut attached = 0usize;
    for node in anchors {
        let line = node.loc.line;
        let mut claimed = Vec::new();
        while let Some(c) = comments.next_if(|c| c.loc.line < line) {
            claimed.push(c);
        }
        if claimed.is_empty() {
            continue;
        }
        attached += claimed.len();

        let mut split = claimed.len();
        let mut expect = line.saturating_sub(1);
        while split > 0 && claimed[split - 1].loc.line == expect {
            split -= 1;
            expect = expect.saturating_sub(1);
        }
        node.comments = claimed.split_off(split).into_iter().map(|c| c.value).collect();
        node.scope_comments = claimed;
    }

    parsed.comments = comments.collect();
    log::trace!(
        "attached {attached} comment lines, {} left pooled",
        parsed.comments.len()
    );
}

// ── Anchor collection ──
//
// Traversal order matches print order before call reordering.

fn push_dec<'a>(dec: &'a mut Dec, out: &mut Vec<&'a mut AstNode>) {
    match dec {
        Dec::UserType(t) => out.push(&mut t.node),
        Dec::Stage(s) => push_stage(s, out),
        Dec::Pipeline(p) => push_pipeline(p, out),
    }
}

fn push_params<'a>(ins: &'a mut [InParam], outs: &'a mut [OutParam], out: &mut Vec<&'a mut AstNode>) {
    out.extend(ins.iter_mut().map(|p| &mut p.node));
    out.extend(outs.iter_mut().map(|p| &mut p.node));
}

fn push_stage<'a>(stage: &'a mut Stage, out: &mut Vec<&'a mut AstNode>) {
    out.push(&mut stage.node);
    push_params(&mut stage.in_params, &mut stage.out_params, out);
    out.push(&mut stage.src.node);
    if let Some(split) = &mut stage.split {
        out.push(&mut split.node);
        push_params(&mut split.in_params, &mut split.out_params, out);
    }
    if let Some(res) = &mut stage.resources {
        out.push(&mut res.node);
        if let Some(f) = &mut res.mem_gb {
            out.push(&mut f.node);
        }
        if let Some(f) = &mut res.special {
            out.push(&mut f.node);
        }
        if let Some(f) = &mut res.threads {
            out.push(&mut f.node);
        }
        if let Some(n) = &mut res.volatile {
            out.push(n);
        }
    }
    if let Some(retain) = &mut stage.retain {
        out.push(&mut retain.node);
        out.extend(retain.params.iter_mut().map(|p| &mut p.node));
    }
}

fn push_pipeline<'a>(pipeline: &'a mut Pipeline, out: &mut Vec<&'a mut AstNode>) {
    out.push(&mut pipeline.node);
    push_params(&mut pipeline.in_params, &mut pipeline.out_params, out);
    for call in &mut pipeline.calls {
        push_call(call, out);
    }
    out.push(&mut pipeline.ret.node);
    push_bindings(&mut pipeline.ret.bindings, out);
    if let Some(retain) = &mut pipeline.retain {
        out.push(&mut retain.node);
        out.extend(retain.refs.iter_mut().map(|r| &mut r.node));
    }
}

fn push_call<'a>(call: &'a mut CallStm, out: &mut Vec<&'a mut AstNode>) {
    out.push(&mut call.node);
    push_bindings(&mut call.bindings, out);
    if let Some(bindings) = &mut call.modifiers.bindings {
        push_bindings(bindings, out);
    }
}

fn push_bindings<'a>(bindings: &'a mut BindStms, out: &mut Vec<&'a mut AstNode>) {
    out.extend(bindings.list.iter_mut().map(|b| &mut b.node));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use crate::parser::parse;
    use crate::source::FileId;

    fn parse_attached(source: &str) -> ParsedFile {
        let mut interner = Interner::new();
        let mut parsed = parse(source, FileId(0), "test.mro", &mut interner)
            .unwrap_or_else(|e| panic!("unexpected error: {e}"));
        attach(&mut parsed);
        parsed
    }

    fn scope_values(node: &AstNode) -> Vec<&str> {
        node.scope_comments.iter().map(|c| c.value.as_str()).collect()
    }

    #[test]
    fn header_splits_into_scope_and_comments() {
        let parsed = parse_attached(
            "# banner\n\n# more\n\n# Get stuff.\n@include \"x.mro\"\n",
        );
        let node = &parsed.includes[0].node;
        assert_eq!(scope_values(node), vec!["# banner", "# more"]);
        assert_eq!(node.comments, vec!["# Get stuff."]);
        assert!(parsed.comments.is_empty());
    }

    #[test]
    fn blank_line_before_node_makes_everything_scope() {
        let parsed = parse_attached("# a\n# b\n\nfiletype json;\n");
        let Dec::UserType(t) = &parsed.decs[0] else {
            panic!("expected filetype");
        };
        assert_eq!(scope_values(&t.node), vec!["# a", "# b"]);
        assert!(t.node.comments.is_empty());
    }

    #[test]
    fn param_and_resource_comments() {
        let parsed = parse_attached(
            r#"stage A(
    # first
    # line two
    in  int x,
    # the source
    src py  "a",
) using (
    # lots
    mem_gb   = 4,
    volatile = strict,
)
"#,
        );
        let Dec::Stage(stage) = &parsed.decs[0] else {
            panic!("expected stage");
        };
        assert_eq!(stage.in_params[0].node.comments, vec!["# first", "# line two"]);
        assert_eq!(stage.src.node.comments, vec!["# the source"]);
        let res = stage.resources.as_ref().expect("resources");
        assert_eq!(
            res.mem_gb.as_ref().map(|f| f.node.comments.clone()),
            Some(vec!["# lots".to_string()])
        );
        assert!(res.node.comments.is_empty());
    }

    #[test]
    fn binding_and_modifier_comments() {
        let parsed = parse_attached(
            r#"call P(
    # the key
    key = "1",
) using (
    # may skip
    disabled = A.skip,
)
"#,
        );
        let call = parsed.call.expect("call");
        assert_eq!(call.bindings.list[0].node.comments, vec!["# the key"]);
        let mods = call.modifiers.bindings.expect("using");
        assert_eq!(mods.list[0].node.comments, vec!["# may skip"]);
    }

    #[test]
    fn trailing_comments_stay_pooled() {
        let parsed = parse_attached("filetype json;\n# the end\n\n# really\n");
        let values: Vec<_> = parsed.comments.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["# the end", "# really"]);
    }

    #[test]
    fn same_line_nodes_outermost_claims() {
        let parsed = parse_attached("# doc\ncall P(x = 1)\n");
        let call = parsed.call.expect("call");
        assert_eq!(call.node.comments, vec!["# doc"]);
        assert!(call.bindings.list[0].node.comments.is_empty());
    }
}
