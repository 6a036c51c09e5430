//! Splits a file into retrievable units.
//!
//! Source code is parsed with tree-sitter and cut at top-level declarations
//! (functions, classes, function-valued variables, and the closest equivalents
//! in each supported language). Leading comments and attributes travel with the
//! declaration they document. Prose is split into blank-line separated blocks.
//!
//! Extraction never fails: a source file that cannot be parsed, or that has no
//! recognizable declarations, becomes a single [`FILE_FALLBACK_LABEL`] chunk.

use std::path::Path;

use tree_sitter::{Node, Parser};

use crate::error::{IndexError, Result};
use crate::languages::{Lang, detect_language};

/// Label of a paragraph-like block from a prose file.
pub const TEXT_BLOCK_LABEL: &str = "TEXT_BLOCK";
/// Label of the single whole-file chunk emitted when structural parsing fails.
pub const FILE_FALLBACK_LABEL: &str = "FILE_FALLBACK";
/// Class-like units longer than this are emitted per method.
pub const DEFAULT_MAX_CLASS_LINES: usize = 300;

const FUNCTION_VALUE_KINDS: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

/// A unit of text extracted from a file, before embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Class-like units spanning more lines than this are split into methods.
    pub max_class_lines: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_class_lines: DEFAULT_MAX_CLASS_LINES,
        }
    }
}

/// Pure `(path, content) -> chunks` extraction.
#[derive(Debug, Clone, Default)]
pub struct ChunkExtractor {
    config: ChunkerConfig,
}

/// A recognized top-level declaration.
struct Unit<'t> {
    label: String,
    /// Present for class-like units that may be split into methods.
    container: Option<Container<'t>>,
}

struct Container<'t> {
    name: String,
    body: Node<'t>,
}

struct Ctx<'a> {
    source: &'a str,
    lang: Lang,
    max_class_lines: usize,
}

impl ChunkExtractor {
    #[must_use]
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Extract chunks from `content`, choosing the strategy from `path`'s extension.
    ///
    /// Whitespace-only content yields no chunks.
    #[must_use]
    pub fn extract(&self, path: &str, content: &str) -> Vec<Chunk> {
        if content.trim().is_empty() {
            return Vec::new();
        }
        match detect_language(Path::new(path)) {
            Some(lang) if !lang.is_prose() => match self.extract_code(content, lang) {
                Ok(chunks) if !chunks.is_empty() => chunks,
                Ok(_) => {
                    tracing::debug!(file = path, "no declarations found, indexing whole file");
                    vec![whole_file(content)]
                }
                Err(e) => {
                    tracing::debug!(file = path, error = %e, "structural parse failed, indexing whole file");
                    vec![whole_file(content)]
                }
            },
            _ => split_text_blocks(content),
        }
    }

    fn extract_code(&self, source: &str, lang: Lang) -> Result<Vec<Chunk>> {
        let grammar = lang
            .grammar()
            .ok_or_else(|| IndexError::Parse(format!("no grammar for {lang}")))?;

        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| IndexError::Parse("parser returned no tree".into()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(IndexError::Parse("syntax errors in source".into()));
        }

        let ctx = Ctx {
            source,
            lang,
            max_class_lines: self.config.max_class_lines,
        };
        let mut chunks = Vec::new();
        for (unit_node, first, unit) in with_leading(root, lang, |n| classify(n, &ctx)) {
            emit_unit(&ctx, unit_node, first, unit, &mut chunks);
        }
        Ok(chunks)
    }
}

/// Walk `parent`'s named children, pairing each recognized unit with the first
/// node of the comment/attribute run directly above it.
fn with_leading<'t, T>(
    parent: Node<'t>,
    lang: Lang,
    mut recognize: impl FnMut(Node<'t>) -> Option<T>,
) -> Vec<(Node<'t>, Node<'t>, T)> {
    let leading = lang.leading_kinds();
    let mut run: Option<(Node<'t>, usize)> = None;
    let mut out = Vec::new();

    for child in named_children(parent) {
        let start_row = child.start_position().row;
        if leading.contains(&child.kind()) {
            run = match run {
                Some((first, end_row)) if start_row <= end_row + 1 => {
                    Some((first, child.end_position().row))
                }
                _ => Some((child, child.end_position().row)),
            };
            continue;
        }

        let first = run
            .take()
            .filter(|(_, end_row)| start_row <= end_row + 1)
            .map_or(child, |(first, _)| first);
        if let Some(item) = recognize(child) {
            out.push((child, first, item));
        }
    }
    out
}

fn emit_unit(ctx: &Ctx<'_>, node: Node<'_>, first: Node<'_>, unit: Unit<'_>, out: &mut Vec<Chunk>) {
    let span = node.end_position().row - node.start_position().row + 1;
    if let Some(container) = &unit.container
        && span > ctx.max_class_lines
    {
        let methods = method_chunks(ctx, container);
        if !methods.is_empty() {
            tracing::trace!(unit = %unit.label, lines = span, methods = methods.len(), "split oversized unit");
            out.extend(methods);
            return;
        }
    }
    out.push(span_chunk(ctx.source, first, node, unit.label));
}

fn method_chunks(ctx: &Ctx<'_>, container: &Container<'_>) -> Vec<Chunk> {
    with_leading(container.body, ctx.lang, |n| method_name(n, ctx.lang, ctx.source))
        .into_iter()
        .map(|(node, first, name)| {
            span_chunk(
                ctx.source,
                first,
                node,
                format!("Method {}.{name}", container.name),
            )
        })
        .collect()
}

fn span_chunk(source: &str, first: Node<'_>, last: Node<'_>, label: String) -> Chunk {
    Chunk {
        content: source
            .get(first.start_byte()..last.end_byte())
            .unwrap_or_default()
            .to_owned(),
        start_line: first.start_position().row + 1,
        end_line: last.end_position().row + 1,
        label,
    }
}

fn whole_file(content: &str) -> Chunk {
    Chunk {
        content: content.to_owned(),
        start_line: 1,
        end_line: content.lines().count().max(1),
        label: FILE_FALLBACK_LABEL.to_owned(),
    }
}

fn classify<'t>(node: Node<'t>, ctx: &Ctx<'_>) -> Option<Unit<'t>> {
    match ctx.lang {
        Lang::JavaScript | Lang::TypeScript | Lang::Tsx => classify_js(node, ctx.source),
        Lang::Python => classify_python(node, ctx.source),
        Lang::Rust => classify_rust(node, ctx.source),
        Lang::Go => classify_go(node, ctx.source),
        Lang::Markdown | Lang::PlainText => None,
    }
}

fn classify_js<'t>(node: Node<'t>, src: &str) -> Option<Unit<'t>> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            Some(plain(format!("Function {}", field_or(node, "name", src, "anonymous"))))
        }
        "class_declaration" | "abstract_class_declaration" | "class" => {
            let name = field_or(node, "name", src, "anonymous").to_owned();
            Some(container_unit("Class", name, node.child_by_field_name("body")))
        }
        "interface_declaration" => Some(plain(format!("Interface {}", field(node, "name", src)?))),
        "type_alias_declaration" => Some(plain(format!("Type {}", field(node, "name", src)?))),
        "enum_declaration" => Some(plain(format!("Enum {}", field(node, "name", src)?))),
        "lexical_declaration" | "variable_declaration" => named_children(node)
            .filter(|d| d.kind() == "variable_declarator")
            .find(|d| {
                d.child_by_field_name("value")
                    .is_some_and(|v| FUNCTION_VALUE_KINDS.contains(&v.kind()))
            })
            .and_then(|d| field(d, "name", src))
            .map(|name| plain(format!("Function {name}"))),
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                return classify_js(decl, src);
            }
            let value = node.child_by_field_name("value")?;
            if FUNCTION_VALUE_KINDS.contains(&value.kind()) {
                Some(plain(format!("Function {}", field_or(value, "name", src, "default"))))
            } else {
                classify_js(value, src)
            }
        }
        _ => None,
    }
}

fn classify_python<'t>(node: Node<'t>, src: &str) -> Option<Unit<'t>> {
    match node.kind() {
        "function_definition" => Some(plain(format!("Function {}", field(node, "name", src)?))),
        "class_definition" => {
            let name = field(node, "name", src)?.to_owned();
            Some(container_unit("Class", name, node.child_by_field_name("body")))
        }
        "decorated_definition" => classify_python(node.child_by_field_name("definition")?, src),
        _ => None,
    }
}

fn classify_rust<'t>(node: Node<'t>, src: &str) -> Option<Unit<'t>> {
    let kind = match node.kind() {
        "function_item" => "Function",
        "struct_item" | "union_item" => "Struct",
        "enum_item" => "Enum",
        "type_item" => "Type",
        "macro_definition" => "Macro",
        "mod_item" => "Module",
        "trait_item" => {
            let name = field(node, "name", src)?.to_owned();
            return Some(container_unit("Trait", name, node.child_by_field_name("body")));
        }
        "impl_item" => {
            let ty = field(node, "type", src)?;
            let label = match field(node, "trait", src) {
                Some(tr) => format!("Impl {tr} for {ty}"),
                None => format!("Impl {ty}"),
            };
            // Methods are named after the implementing type, not the trait.
            let container = node.child_by_field_name("body").map(|body| Container {
                name: ty.to_owned(),
                body,
            });
            return Some(Unit { label, container });
        }
        _ => return None,
    };
    Some(plain(format!("{kind} {}", field(node, "name", src)?)))
}

fn classify_go<'t>(node: Node<'t>, src: &str) -> Option<Unit<'t>> {
    match node.kind() {
        "function_declaration" => Some(plain(format!("Function {}", field(node, "name", src)?))),
        "method_declaration" => {
            let name = field(node, "name", src)?;
            let receiver = node
                .child_by_field_name("receiver")
                .and_then(|r| named_children(r).find(|p| p.kind() == "parameter_declaration"))
                .and_then(|p| field(p, "type", src))
                .map(|t| {
                    let t = t.trim_start_matches('*');
                    t.split('[').next().unwrap_or(t)
                });
            Some(plain(match receiver {
                Some(recv) => format!("Method {recv}.{name}"),
                None => format!("Function {name}"),
            }))
        }
        "type_declaration" => {
            let spec = named_children(node).find(|n| matches!(n.kind(), "type_spec" | "type_alias"))?;
            let name = field(spec, "name", src)?;
            let is_interface = spec
                .child_by_field_name("type")
                .is_some_and(|t| t.kind() == "interface_type");
            Some(plain(if is_interface {
                format!("Interface {name}")
            } else {
                format!("Type {name}")
            }))
        }
        _ => None,
    }
}

/// Name of a method-like member inside a class body, if `node` is one.
fn method_name(node: Node<'_>, lang: Lang, src: &str) -> Option<String> {
    let name = match (lang, node.kind()) {
        (
            Lang::JavaScript | Lang::TypeScript | Lang::Tsx,
            "method_definition" | "abstract_method_signature",
        )
        | (Lang::Python, "function_definition")
        | (Lang::Rust, "function_item" | "function_signature_item") => field(node, "name", src)?,
        (Lang::JavaScript | Lang::TypeScript | Lang::Tsx, "public_field_definition" | "field_definition") => {
            let value = node.child_by_field_name("value")?;
            if !FUNCTION_VALUE_KINDS.contains(&value.kind()) {
                return None;
            }
            field(node, "name", src).or_else(|| field(node, "property", src))?
        }
        (Lang::Python, "decorated_definition") => {
            let def = node.child_by_field_name("definition")?;
            if def.kind() != "function_definition" {
                return None;
            }
            field(def, "name", src)?
        }
        _ => return None,
    };
    Some(name.to_owned())
}

fn plain<'t>(label: String) -> Unit<'t> {
    Unit {
        label,
        container: None,
    }
}

fn container_unit<'t>(kind: &str, name: String, body: Option<Node<'t>>) -> Unit<'t> {
    Unit {
        label: format!("{kind} {name}"),
        container: body.map(|body| Container { name, body }),
    }
}

fn field<'s>(node: Node<'_>, name: &str, src: &'s str) -> Option<&'s str> {
    node.child_by_field_name(name)
        .and_then(|n| src.get(n.byte_range()))
}

fn field_or<'s>(node: Node<'_>, name: &str, src: &'s str, default: &'s str) -> &'s str {
    field(node, name, src).unwrap_or(default)
}

fn named_children<'t>(node: Node<'t>) -> impl Iterator<Item = Node<'t>> {
    let count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    (0..count).filter_map(move |i| node.named_child(i))
}

/// Split prose into blocks separated by blank lines; fenced code blocks are
/// never split.
fn split_text_blocks(content: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut block_start = 0;
    let mut fence: Option<&str> = None;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            block.push(line);
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if line.trim().is_empty() {
            flush_block(&mut block, block_start, &mut chunks);
            continue;
        }
        if block.is_empty() {
            block_start = idx;
        }
        block.push(line);
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence = trimmed.get(..3);
        }
    }
    flush_block(&mut block, block_start, &mut chunks);
    chunks
}

fn flush_block(block: &mut Vec<&str>, start: usize, out: &mut Vec<Chunk>) {
    if block.is_empty() {
        return;
    }
    out.push(Chunk {
        content: block.join("\n"),
        start_line: start + 1,
        end_line: start + block.len(),
        label: TEXT_BLOCK_LABEL.to_owned(),
    });
    block.clear();
}
