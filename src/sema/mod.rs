mod check;
mod expand;
mod fold;

use crate::ast::{FuncDecl, Item, TypeExpr};
use crate::error::{Diagnostic, Severity};
use crate::include::NsItem;
use crate::token::Pos;
use crate::types::{EnumInfo, Type, TypeTable};
use indexmap::IndexMap;

/// A function symbol: signature, linkage name, whether a body exists in
/// this translation unit.
#[derive(Debug, Clone)]
pub struct FuncSym {
    pub params: Vec<(String, Type)>,
    pub ret: Type,
    pub varargs: bool,
    pub defined: bool,
    pub linkage: String,
    pub pos: Pos,
}

impl FuncSym {
    pub fn same_signature(&self, other: &FuncSym) -> bool {
        self.ret == other.ret
            && self.varargs == other.varargs
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|((_, a), (_, b))| a == b)
    }
}

/// A global `let` binding.
#[derive(Debug, Clone)]
pub struct GlobalSym {
    pub ty: Type,
    pub is_const: bool,
    pub init: Option<crate::ast::Expr>,
    pub linkage: String,
    pub pos: Pos,
}

/// A function with a body, ready for code generation. Local names have been
/// rewritten to be unique within the function; `locals` lists every frame
/// slot (parameters first) in declaration order.
#[derive(Debug, Clone)]
pub struct FuncUnit {
    /// Qualified name, e.g. `math::add` or `main`.
    pub name: String,
    pub linkage: String,
    pub namespace: Option<String>,
    pub locals: IndexMap<String, Type>,
    pub decl: FuncDecl,
}

/// Everything code generation needs: the type environment, the symbol
/// tables, and the checked function bodies.
#[derive(Debug, Default)]
pub struct Analysis {
    pub types: TypeTable,
    pub funcs: IndexMap<String, FuncSym>,
    pub globals: IndexMap<String, GlobalSym>,
    pub units: Vec<FuncUnit>,
}

/// What a (possibly qualified) identifier resolves to outside local scopes.
pub enum Resolved<'a> {
    Global(&'a str, &'a GlobalSym),
    Func(&'a str, &'a FuncSym),
    EnumConst(i64),
}

impl Analysis {
    /// Candidate qualified keys for `path` seen from namespace `ns`: the
    /// current namespace first, then the top level.
    fn candidates(path: &[String], ns: Option<&str>) -> Vec<String> {
        let joined = path.join("::");
        let mut keys = Vec::new();
        if path.len() == 1 {
            if let Some(ns) = ns {
                keys.push(format!("{ns}::{joined}"));
            }
        }
        keys.push(joined);
        keys
    }

    pub fn lookup_type(&self, path: &[String], ns: Option<&str>) -> Option<Type> {
        for key in Self::candidates(path, ns) {
            if self.types.structs.contains_key(&key) {
                return Some(Type::Struct(key));
            }
            if self.types.enums.contains_key(&key) {
                return Some(Type::Enum(key));
            }
            if self.types.unions.contains_key(&key) {
                return Some(Type::Union(key));
            }
        }
        None
    }

    /// Resolve a value path: a global, a function, or an enum constant
    /// (`Color::RED`, `ns::Color::RED`). A bare name that is not found at
    /// the top level falls back to a unique match across namespaces, which
    /// is what lets a concatenated library file call its own functions
    /// unqualified.
    pub fn lookup_value(&self, path: &[String], ns: Option<&str>) -> Option<Resolved<'_>> {
        // Enum constant: [Enum, V] or [ns, Enum, V]
        if path.len() >= 2 {
            let (variant, enum_path) = path.split_last().unwrap();
            if let Some(Type::Enum(key)) = self.lookup_type(enum_path, ns) {
                let info = &self.types.enums[&key];
                if let Some(value) = info.variants.get(variant) {
                    return Some(Resolved::EnumConst(*value));
                }
            }
        }

        for key in Self::candidates(path, ns) {
            if let Some((name, sym)) = self.globals.get_key_value(&key) {
                return Some(Resolved::Global(name, sym));
            }
            if let Some((name, sym)) = self.funcs.get_key_value(&key) {
                return Some(Resolved::Func(name, sym));
            }
        }

        // Unique cross-namespace fallback for bare names.
        if path.len() == 1 {
            let suffix = format!("::{}", path[0]);
            let mut hits = self
                .funcs
                .iter()
                .filter(|(k, _)| k.ends_with(&suffix))
                .map(|(k, v)| Resolved::Func(k.as_str(), v));
            if let (Some(hit), None) = (hits.next(), hits.next()) {
                return Some(hit);
            }
            let mut hits = self
                .globals
                .iter()
                .filter(|(k, _)| k.ends_with(&suffix))
                .map(|(k, v)| Resolved::Global(k.as_str(), v));
            if let (Some(hit), None) = (hits.next(), hits.next()) {
                return Some(hit);
            }
        }
        None
    }
}

fn qualify(ns: Option<&str>, name: &str) -> String {
    match ns {
        Some(ns) => format!("{ns}::{name}"),
        None => name.to_string(),
    }
}

/// Linkage symbol for a defined function or global: `<namespace>__<name>`,
/// where the namespace part is empty for top-level user code, so `main`
/// remains `main`.
fn linkage_name(ns: Option<&str>, name: &str) -> String {
    match ns {
        Some(ns) => format!("{ns}__{name}"),
        None => name.to_string(),
    }
}

pub struct Options {
    pub require_main: bool,
}

/// Run semantic analysis over the flattened translation unit. Always
/// returns the analysis together with every diagnostic found; the caller
/// decides whether errors block code generation.
pub fn analyze(items: Vec<NsItem>, options: &Options) -> (Analysis, Vec<Diagnostic>) {
    let mut diags = Vec::new();
    let mut analysis = Analysis::default();

    let items = collect_types(items, &mut analysis, &mut diags);
    let items = expand::expand_macros(items, &mut diags);
    let items = expand::lift_lambdas(items, &mut diags);
    let items = collect_symbols(items, &mut analysis, &mut diags);
    let mut units = check::check_units(items, &mut analysis, &mut diags);
    for unit in &mut units {
        fold::fold_func(&mut unit.decl);
    }
    analysis.units = units;

    if options.require_main && !analysis.funcs.get("main").map_or(false, |f| f.defined) {
        diags.push(Diagnostic::error(
            "E009",
            Pos::builtin(),
            "missing entry point: define a 'void main()' or 'int main()' function",
        ));
    }

    diags.sort_by_key(|d| {
        (
            d.pos.file.to_string(),
            d.pos.line,
            d.pos.col,
            (d.severity == Severity::Warning) as u8,
        )
    });
    (analysis, diags)
}

/// Resolve a syntactic type against the collected type names. Unknown names
/// are E018.
pub fn resolve_type(
    te: &TypeExpr,
    ns: Option<&str>,
    analysis: &Analysis,
    pos: &Pos,
    diags: &mut Vec<Diagnostic>,
) -> Type {
    match te {
        TypeExpr::Int { width, signed } => Type::Int {
            width: *width,
            signed: *signed,
        },
        TypeExpr::Float { width } => Type::Float { width: *width },
        TypeExpr::Char => Type::Char,
        TypeExpr::Str => Type::Str,
        TypeExpr::Void => Type::Void,
        TypeExpr::Array(elem) => Type::Array(Box::new(resolve_type(elem, ns, analysis, pos, diags))),
        TypeExpr::Ptr(inner) => Type::ptr(resolve_type(inner, ns, analysis, pos, diags)),
        TypeExpr::Named(path) => match analysis.lookup_type(path, ns) {
            Some(ty) => ty,
            None => {
                diags.push(Diagnostic::error(
                    "E018",
                    pos.clone(),
                    format!("unknown type '{}'", path.join("::")),
                ));
                Type::int(64)
            }
        },
    }
}

// ----------------------------------------------------------------------------
// Pass 1a: type declarations
// ----------------------------------------------------------------------------

fn collect_types(
    items: Vec<NsItem>,
    analysis: &mut Analysis,
    diags: &mut Vec<Diagnostic>,
) -> Vec<NsItem> {
    use crate::types::{StructInfo, UnionInfo};

    // Register every type name first so declaration order does not matter.
    let mut pending_structs: IndexMap<String, (Vec<(TypeExpr, String)>, Option<String>, Pos)> =
        IndexMap::new();
    let mut pending_unions: IndexMap<String, (Vec<TypeExpr>, Option<String>, Pos)> =
        IndexMap::new();

    for nsitem in &items {
        let ns = nsitem.namespace.as_deref();
        match &nsitem.item {
            Item::Struct(decl) => {
                let key = qualify(ns, &decl.name);
                if pending_structs.contains_key(&key)
                    || analysis.types.enums.contains_key(&key)
                    || analysis.types.unions.contains_key(&key)
                {
                    diags.push(duplicate(&key, &decl.pos));
                    continue;
                }
                pending_structs.insert(
                    key.clone(),
                    (
                        decl.fields.clone(),
                        nsitem.namespace.clone(),
                        decl.pos.clone(),
                    ),
                );
                // Placeholder so name lookups during field resolution see it.
                analysis.types.structs.insert(
                    key,
                    StructInfo {
                        fields: IndexMap::new(),
                        size: 0,
                        align: 1,
                    },
                );
            }
            Item::Enum(decl) => {
                let key = qualify(ns, &decl.name);
                if analysis.types.enums.contains_key(&key)
                    || analysis.types.structs.contains_key(&key)
                    || analysis.types.unions.contains_key(&key)
                {
                    diags.push(duplicate(&key, &decl.pos));
                    continue;
                }
                let variants = decl
                    .variants
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (v.clone(), i as i64))
                    .collect();
                analysis.types.enums.insert(key, EnumInfo { variants });
            }
            Item::Union(decl) => {
                let key = qualify(ns, &decl.name);
                if pending_unions.contains_key(&key)
                    || analysis.types.structs.contains_key(&key)
                    || analysis.types.enums.contains_key(&key)
                {
                    diags.push(duplicate(&key, &decl.pos));
                    continue;
                }
                pending_unions.insert(
                    key.clone(),
                    (
                        decl.variants.clone(),
                        nsitem.namespace.clone(),
                        decl.pos.clone(),
                    ),
                );
                analysis.types.unions.insert(
                    key,
                    UnionInfo {
                        variants: Vec::new(),
                        size: 0,
                        align: 1,
                    },
                );
            }
            _ => {}
        }
    }

    // Resolve field types, then lay structs out with memoised recursion so a
    // struct nested by value is sized before its container.
    let mut resolved: IndexMap<String, Vec<(String, Type)>> = IndexMap::new();
    for (key, (fields, ns, pos)) in &pending_structs {
        let fields = fields
            .iter()
            .map(|(te, name)| {
                (
                    name.clone(),
                    resolve_type(te, ns.as_deref(), analysis, pos, diags),
                )
            })
            .collect();
        resolved.insert(key.clone(), fields);
    }

    let keys: Vec<String> = resolved.keys().cloned().collect();
    let mut done: Vec<String> = Vec::new();
    for key in &keys {
        layout_struct_rec(key, &resolved, analysis, &mut Vec::new(), &mut done, diags);
    }

    for (key, (variants, ns, pos)) in &pending_unions {
        let variants: Vec<Type> = variants
            .iter()
            .map(|te| resolve_type(te, ns.as_deref(), analysis, pos, diags))
            .collect();
        let info = analysis.types.layout_union(variants);
        analysis.types.unions.insert(key.clone(), info);
    }

    items
        .into_iter()
        .filter(|i| !matches!(i.item, Item::Struct(_) | Item::Enum(_) | Item::Union(_)))
        .collect()
}

fn layout_struct_rec(
    key: &str,
    resolved: &IndexMap<String, Vec<(String, Type)>>,
    analysis: &mut Analysis,
    visiting: &mut Vec<String>,
    done: &mut Vec<String>,
    diags: &mut Vec<Diagnostic>,
) {
    if done.iter().any(|k| k == key) {
        return;
    }
    if visiting.iter().any(|k| k == key) {
        diags.push(Diagnostic::error(
            "E018",
            Pos::builtin(),
            format!("struct '{key}' contains itself by value"),
        ));
        done.push(key.to_string());
        return;
    }
    visiting.push(key.to_string());
    let Some(fields) = resolved.get(key) else {
        visiting.pop();
        return;
    };
    for (_, ty) in fields {
        if let Type::Struct(inner) = ty {
            let inner = inner.clone();
            layout_struct_rec(&inner, resolved, analysis, visiting, done, diags);
        }
    }
    let info = analysis.types.layout_struct(fields);
    analysis.types.structs.insert(key.to_string(), info);
    visiting.pop();
    done.push(key.to_string());
}

fn duplicate(name: &str, pos: &Pos) -> Diagnostic {
    Diagnostic::error(
        "E041",
        pos.clone(),
        format!("duplicate definition of '{name}'"),
    )
}

// ----------------------------------------------------------------------------
// Pass 1b: functions, globals, prototypes
// ----------------------------------------------------------------------------

fn collect_symbols(
    items: Vec<NsItem>,
    analysis: &mut Analysis,
    diags: &mut Vec<Diagnostic>,
) -> Vec<NsItem> {
    // Register prototypes and definitions under their qualified names.
    // Forward declarations are reconciled with definitions by
    // exact-signature match (E030).
    for nsitem in &items {
        let ns = nsitem.namespace.as_deref();
        match &nsitem.item {
            Item::Func(decl) => {
                let key = qualify(ns, &decl.name);
                let sym = func_sym(decl, ns, analysis, diags);
                match analysis.funcs.get_mut(&key) {
                    None => {
                        analysis.funcs.insert(key, sym);
                    }
                    Some(existing) => {
                        if !existing.same_signature(&sym) {
                            diags.push(Diagnostic::error(
                                "E030",
                                decl.pos.clone(),
                                format!("signature of '{key}' does not match its declaration"),
                            ));
                        } else if existing.defined && sym.defined {
                            diags.push(duplicate(&key, &decl.pos));
                        } else if sym.defined {
                            existing.defined = true;
                            existing.linkage = sym.linkage;
                            existing.pos = sym.pos;
                        }
                    }
                }
            }
            Item::Global(decl) => {
                let key = qualify(ns, &decl.name);
                if analysis.globals.contains_key(&key) {
                    diags.push(duplicate(&key, &decl.pos));
                    continue;
                }
                let ty = resolve_type(&decl.ty, ns, analysis, &decl.pos, diags);
                analysis.globals.insert(
                    key.clone(),
                    GlobalSym {
                        ty,
                        is_const: decl.is_const,
                        init: decl.init.clone(),
                        linkage: linkage_name(ns, &decl.name),
                        pos: decl.pos.clone(),
                    },
                );
            }
            _ => {}
        }
    }

    // Adopt a top-level definition into the namespace of the unique header
    // prototype carrying its name: the prototype supplied the contract, the
    // definition the body, and both link under the namespaced symbol. This
    // is what makes `c5c prog.c5 mathlib.c5` resolve `math::add` to the
    // definition in mathlib.c5.
    let adoptions: Vec<(String, String)> = analysis
        .funcs
        .iter()
        .filter(|(key, sym)| !key.contains("::") && sym.defined)
        .filter_map(|(key, _)| {
            let suffix = format!("::{key}");
            let mut protos = analysis
                .funcs
                .iter()
                .filter(|(k, s)| k.ends_with(&suffix) && !s.defined);
            match (protos.next(), protos.next()) {
                (Some((proto_key, _)), None) => Some((key.clone(), proto_key.clone())),
                _ => None,
            }
        })
        .collect();

    let mut adopted: IndexMap<String, String> = IndexMap::new();
    for (plain, qualified) in adoptions {
        let def = analysis.funcs.shift_remove(&plain).unwrap();
        let proto = analysis.funcs.get_mut(&qualified).unwrap();
        if !proto.same_signature(&def) {
            diags.push(Diagnostic::error(
                "E030",
                def.pos.clone(),
                format!("signature of '{plain}' does not match prototype '{qualified}'"),
            ));
            analysis.funcs.insert(plain, def);
            continue;
        }
        let ns = qualified.split("::").next().unwrap().to_string();
        proto.defined = true;
        proto.linkage = linkage_name(Some(&ns), &plain);
        proto.pos = def.pos;
        adopted.insert(plain, qualified);
    }

    // A prototype with no definition anywhere in the unit is an external C
    // import and keeps its unmangled base name: std::printf links to printf.
    for (key, sym) in analysis.funcs.iter_mut() {
        if !sym.defined {
            sym.linkage = key.rsplit("::").next().unwrap().to_string();
        }
    }

    // Retag adopted definitions so their bodies are generated under the
    // namespace they now belong to.
    items
        .into_iter()
        .map(|mut nsitem| {
            if nsitem.namespace.is_none() {
                if let Item::Func(decl) = &nsitem.item {
                    if decl.body.is_some() {
                        if let Some(qualified) = adopted.get(&decl.name) {
                            let ns = qualified.split("::").next().unwrap().to_string();
                            nsitem.namespace = Some(ns);
                        }
                    }
                }
            }
            nsitem
        })
        .collect()
}

fn func_sym(
    decl: &FuncDecl,
    ns: Option<&str>,
    analysis: &Analysis,
    diags: &mut Vec<Diagnostic>,
) -> FuncSym {
    let params = decl
        .params
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                resolve_type(&p.ty, ns, analysis, &decl.pos, diags),
            )
        })
        .collect();
    let ret = resolve_type(&decl.ret, ns, analysis, &decl.pos, diags);
    FuncSym {
        params,
        ret,
        varargs: decl.varargs,
        defined: decl.body.is_some(),
        linkage: linkage_name(ns, &decl.name),
        pos: decl.pos.clone(),
    }
}
