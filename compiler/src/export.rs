// export.rs — Bulk JSON projection of parsed units
//
// A read-only view of one or more units for tooling: every user type,
// stage and pipeline, keyed by identifier. When several units declare the
// same id, the last one wins.
//
// Preconditions: none.
// Postconditions: output is deterministic; ids and map keys are sorted.
// Failure modes: serialization errors from serde_json.
// Side effects: none.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value as Json;

use crate::ast::*;
use crate::intern::DEFAULT_ID;

/// Pretty-printed JSON of `{UserTypes, Stages, Pipelines}` across `asts`.
pub fn json_dump(asts: &[Ast]) -> serde_json::Result<String> {
    let mut dump = Dump::default();
    for ast in asts {
        let p = Projector { ast };
        for t in &ast.user_types {
            dump.user_types
                .insert(ast.name(t.id).to_string(), p.user_type(t));
        }
        for s in ast.stages() {
            dump.stages.insert(ast.name(s.id).to_string(), p.stage(s));
        }
        for pl in ast.pipelines() {
            dump.pipelines
                .insert(ast.name(pl.id).to_string(), p.pipeline(pl));
        }
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    dump.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

// ── Projection types ────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Dump {
    user_types: BTreeMap<String, UserTypeJson>,
    stages: BTreeMap<String, StageJson>,
    pipelines: BTreeMap<String, PipelineJson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct LocJson {
    file: String,
    line: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserTypeJson {
    id: String,
    loc: LocJson,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ParamJson {
    mode: &'static str,
    tname: String,
    array_dim: usize,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    out_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SrcJson {
    lang: String,
    path: String,
    args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ResourcesJson {
    #[serde(rename = "MemGB", skip_serializing_if = "Option::is_none")]
    mem_gb: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    threads: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    special: Option<String>,
    strict_volatile: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StageJson {
    id: String,
    loc: LocJson,
    in_params: Vec<ParamJson>,
    out_params: Vec<ParamJson>,
    src: SrcJson,
    split: bool,
    chunk_ins: Vec<ParamJson>,
    chunk_outs: Vec<ParamJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<ResourcesJson>,
    retain: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct BindingJson {
    id: String,
    exp: Json,
    sweep: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CallJson {
    id: String,
    dec_id: String,
    local: bool,
    preflight: bool,
    volatile: bool,
    bindings: Vec<BindingJson>,
    modifier_bindings: Vec<BindingJson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PipelineJson {
    id: String,
    loc: LocJson,
    in_params: Vec<ParamJson>,
    out_params: Vec<ParamJson>,
    calls: Vec<CallJson>,
    #[serde(rename = "Return")]
    ret: Vec<BindingJson>,
    retain: Vec<Json>,
}

// ── Projection ──────────────────────────────────────────────────────────────

struct Projector<'a> {
    ast: &'a Ast,
}

impl Projector<'_> {
    fn name(&self, sym: crate::intern::Sym) -> String {
        self.ast.name(sym).to_string()
    }

    fn loc(&self, node: &AstNode) -> LocJson {
        LocJson {
            file: self.ast.files.name(node.loc.file).to_string(),
            line: node.loc.line,
        }
    }

    fn user_type(&self, t: &UserType) -> UserTypeJson {
        UserTypeJson {
            id: self.name(t.id),
            loc: self.loc(&t.node),
        }
    }

    fn params(&self, ins: &[InParam], outs: &[OutParam]) -> Vec<ParamJson> {
        params(ins, outs)
            .map(|p| ParamJson {
                mode: p.mode(),
                tname: self.name(p.tname()),
                array_dim: p.array_dim(),
                id: self.name(p.id()),
                help: p.help().map(str::to_string),
                out_name: p.out_name().map(str::to_string),
            })
            .collect()
    }

    fn stage(&self, s: &Stage) -> StageJson {
        let (chunk_ins, chunk_outs) = match &s.split {
            Some(split) => (
                self.params(&split.in_params, &[]),
                self.params(&[], &split.out_params),
            ),
            None => (Vec::new(), Vec::new()),
        };
        StageJson {
            id: self.name(s.id),
            loc: self.loc(&s.node),
            in_params: self.params(&s.in_params, &[]),
            out_params: self.params(&[], &s.out_params),
            src: SrcJson {
                lang: self.name(s.src.lang),
                path: s.src.path.clone(),
                args: s.src.args.clone(),
            },
            split: s.split.is_some(),
            chunk_ins,
            chunk_outs,
            resources: s.resources.as_ref().map(|r| ResourcesJson {
                mem_gb: r.mem_gb.as_ref().map(|f| f.value),
                threads: r.threads.as_ref().map(|f| f.value),
                special: r.special.as_ref().map(|f| f.value.clone()),
                strict_volatile: r.volatile.is_some(),
            }),
            retain: s
                .retain
                .iter()
                .flat_map(|r| r.params.iter().map(move |p| self.name(p.id)))
                .collect(),
        }
    }

    fn pipeline(&self, p: &Pipeline) -> PipelineJson {
        PipelineJson {
            id: self.name(p.id),
            loc: self.loc(&p.node),
            in_params: self.params(&p.in_params, &[]),
            out_params: self.params(&[], &p.out_params),
            calls: p.calls.iter().map(|c| self.call(c)).collect(),
            ret: self.bindings(&p.ret.bindings),
            retain: p
                .retain
                .iter()
                .flat_map(|r| r.refs.iter().map(move |r| self.ref_exp(r)))
                .collect(),
        }
    }

    fn call(&self, c: &CallStm) -> CallJson {
        CallJson {
            id: self.name(c.id),
            dec_id: self.name(c.dec_id),
            local: c.modifiers.local,
            preflight: c.modifiers.preflight,
            volatile: c.modifiers.volatile,
            bindings: self.bindings(&c.bindings),
            modifier_bindings: c
                .modifiers
                .bindings
                .as_ref()
                .map(|b| self.bindings(b))
                .unwrap_or_default(),
        }
    }

    fn bindings(&self, stms: &BindStms) -> Vec<BindingJson> {
        stms.list
            .iter()
            .map(|b| BindingJson {
                id: self.name(b.id),
                exp: self.exp(&b.exp),
                sweep: b.sweep,
            })
            .collect()
    }

    fn exp(&self, exp: &Exp) -> Json {
        let value = match exp {
            Exp::Ref(r) => return self.ref_exp(r),
            Exp::Val(v) => &v.value,
        };
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            // The lexer rejects overflow, so `from_f64` only sees finite values.
            Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(|e| self.exp(e)).collect()),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, e)| (k.clone(), self.exp(e)))
                    .collect(),
            ),
        }
    }

    fn ref_exp(&self, r: &RefExp) -> Json {
        match r.target {
            RefTarget::Call { id, output_id } => {
                let mut obj = serde_json::Map::new();
                obj.insert("Id".into(), self.name(id).into());
                obj.insert("Kind".into(), "call".into());
                if self.ast.name(output_id) != DEFAULT_ID {
                    obj.insert("OutputId".into(), self.name(output_id).into());
                }
                Json::Object(obj)
            }
            RefTarget::SelfInput { id } => {
                let mut obj = serde_json::Map::new();
                obj.insert("Id".into(), self.name(id).into());
                obj.insert("Kind".into(), "self".into());
                Json::Object(obj)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_source;

    fn dump(source: &str) -> Json {
        let ast = parse_source(source, "e.mro").unwrap_or_else(|e| panic!("unexpected error: {e}"));
        let text = json_dump(&[ast]).unwrap_or_else(|e| panic!("json: {e}"));
        serde_json::from_str(&text).unwrap_or_else(|e| panic!("reparse: {e}"))
    }

    #[test]
    fn top_level_keys() {
        let json = dump("");
        let obj = json.as_object().expect("object");
        let keys: Vec<_> = obj.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Pipelines", "Stages", "UserTypes"]);
    }

    #[test]
    fn four_space_indent() {
        let ast = parse_source("filetype json;\n", "e.mro").unwrap_or_else(|e| panic!("{e}"));
        let text = json_dump(&[ast]).unwrap_or_else(|e| panic!("{e}"));
        assert!(text.contains("\n    \"Pipelines\": {}"), "{text}");
    }

    #[test]
    fn stage_projection() {
        let json = dump(
            "stage A(\n    in  int[] x  \"help\",\n    out bam   y,\n    src py    \"a.py --fast\",\n) using (\n    mem_gb = 0,\n)\n",
        );
        let a = &json["Stages"]["A"];
        assert_eq!(a["Id"], "A");
        assert_eq!(a["InParams"][0]["ArrayDim"], 1);
        assert_eq!(a["InParams"][0]["Help"], "help");
        assert_eq!(a["OutParams"][0]["Tname"], "bam");
        assert_eq!(a["Src"]["Args"][0], "--fast");
        assert_eq!(a["Resources"]["MemGB"], 0);
        assert!(a["Resources"].get("Threads").is_none());
        assert_eq!(a["Split"], false);
    }

    #[test]
    fn pipeline_expressions() {
        let json = dump(
            "pipeline P(\n    in int x,\n)\n{\n    call A(\n        m = {\"k\": [1, 2.5, null]},\n        r = self.x,\n        s = sweep(1, 2),\n    )\n\n    return ()\n}\n",
        );
        let call = &json["Pipelines"]["P"]["Calls"][0];
        assert_eq!(call["Bindings"][0]["Exp"]["k"][1], 2.5);
        assert_eq!(call["Bindings"][1]["Exp"]["Kind"], "self");
        assert_eq!(call["Bindings"][2]["Sweep"], true);
    }

    #[test]
    fn later_units_win() {
        let a = parse_source("filetype txt;\n", "a.mro").unwrap_or_else(|e| panic!("{e}"));
        let b = parse_source("\n\nfiletype txt;\n", "b.mro").unwrap_or_else(|e| panic!("{e}"));
        let text = json_dump(&[a, b]).unwrap_or_else(|e| panic!("{e}"));
        let json: Json = serde_json::from_str(&text).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(json["UserTypes"]["txt"]["Loc"]["File"], "b.mro");
        assert_eq!(json["UserTypes"]["txt"]["Loc"]["Line"], 3);
    }
}
