//! TypeScript / JavaScript metadata extraction using tree-sitter

use grove_core::{ParsedSource, RawExport, RawImport, RawSymbol};
use tree_sitter::{Node, Tree};

/// Longest signature kept for the summarizer.
const MAX_SIGNATURE_CHARS: usize = 240;

/// Walk the top-level statements of a parsed module.
pub fn extract(tree: &Tree, source: &str, preview_lines: usize) -> ParsedSource {
    let root = tree.root_node();
    let mut extractor = Extractor { source, out: ParsedSource::default() };

    extractor.out.doc_comment = leading_doc_comment(root, source);

    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        extractor.statement(node);
    }
    extractor.dynamic_imports(root);

    let mut out = extractor.out;
    out.preview = source.lines().take(preview_lines).map(str::to_string).collect();
    out.line_count = source.lines().count() as u32;
    out
}

struct Extractor<'s> {
    source: &'s str,
    out: ParsedSource,
}

impl<'s> Extractor<'s> {
    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn field_text(&self, node: Node, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_string())
            .filter(|s| !s.is_empty())
    }

    fn statement(&mut self, node: Node) {
        match node.kind() {
            "import_statement" => self.import_statement(node),
            "export_statement" => self.export_statement(node),
            "expression_statement" => {
                // Side-effect `require('./polyfill')`
                if let Some(call) = node.named_child(0) {
                    if let Some(specifier) = self.require_specifier(call) {
                        self.push_import(specifier, Vec::new(), false, node);
                    }
                }
            }
            _ => {
                self.declaration(node);
            }
        }
    }

    // ── Imports ─────────────────────────────────────────────

    fn import_statement(&mut self, node: Node) {
        let source_node = node.child_by_field_name("source").or_else(|| {
            let mut cursor = node.walk();
            let clause = node
                .named_children(&mut cursor)
                .find(|c| c.kind() == "import_require_clause");
            clause.and_then(|c| c.child_by_field_name("source"))
        });
        let Some(source_node) = source_node else {
            return;
        };
        let specifier = unquote(self.text(source_node));

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_clause" => {
                    let mut inner = child.walk();
                    for part in child.named_children(&mut inner) {
                        match part.kind() {
                            "identifier" => names.push("default".to_string()),
                            "namespace_import" => names.push("*".to_string()),
                            "named_imports" => names.extend(self.specifier_names(part, "import_specifier")),
                            _ => {}
                        }
                    }
                }
                "import_require_clause" => names.push("default".to_string()),
                _ => {}
            }
        }

        self.push_import(specifier, names, false, node);
    }

    /// Original (pre-alias) names listed in `{ a, b as c }`.
    fn specifier_names(&self, list: Node, kind: &str) -> Vec<String> {
        let mut cursor = list.walk();
        list.named_children(&mut cursor)
            .filter(|spec| spec.kind() == kind)
            .filter_map(|spec| self.field_text(spec, "name"))
            .collect()
    }

    fn require_specifier(&self, call: Node) -> Option<String> {
        if call.kind() != "call_expression" {
            return None;
        }
        let function = call.child_by_field_name("function")?;
        if function.kind() != "identifier" || self.text(function) != "require" {
            return None;
        }
        let argument = call.child_by_field_name("arguments")?.named_child(0)?;
        (argument.kind() == "string").then(|| unquote(self.text(argument)))
    }

    fn push_import(&mut self, specifier: String, names: Vec<String>, reexport: bool, node: Node) {
        if specifier.is_empty() {
            return;
        }
        self.out.imports.push(RawImport {
            specifier,
            names,
            reexport,
            line: start_line(node),
        });
    }

    /// `import('./lazy')` anywhere in the file.
    fn dynamic_imports(&mut self, root: Node) {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "call_expression" {
                let is_import = node.child_by_field_name("function").is_some_and(|f| f.kind() == "import");
                let argument = node
                    .child_by_field_name("arguments")
                    .and_then(|args| args.named_child(0))
                    .filter(|arg| arg.kind() == "string");
                if let (true, Some(argument)) = (is_import, argument) {
                    found.push((start_line(node), unquote(self.text(argument))));
                }
            }
            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }

        found.sort();
        for (line, specifier) in found {
            if !specifier.is_empty() {
                self.out.imports.push(RawImport { specifier, names: Vec::new(), reexport: false, line });
            }
        }
    }

    // ── Exports ─────────────────────────────────────────────

    fn export_statement(&mut self, node: Node) {
        let is_default = has_token(node, "default");

        if let Some(source_node) = node.child_by_field_name("source") {
            self.reexport(node, unquote(self.text(source_node)));
            return;
        }

        if let Some(declaration) = node.child_by_field_name("declaration") {
            let declared = self.declaration(declaration);
            if is_default {
                self.push_export("default".to_string(), declared.into_iter().next(), true);
            } else {
                for name in declared {
                    self.push_export(name, None, false);
                }
            }
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            let local = match value.kind() {
                "identifier" => Some(self.text(value).to_string()),
                "function_expression" | "function" | "generator_function" => {
                    let name = self.field_text(value, "name");
                    if let Some(name) = &name {
                        self.push_function(name.clone(), node, value, value.child_by_field_name("body"));
                    }
                    name
                }
                "class" => {
                    let name = self.field_text(value, "name");
                    if let Some(name) = &name {
                        self.out.classes.push(symbol(name.clone(), node, None));
                    }
                    name
                }
                _ => None,
            };
            self.push_export("default".to_string(), local, true);
            return;
        }

        let mut cursor = node.walk();
        for clause in node.named_children(&mut cursor) {
            if clause.kind() != "export_clause" {
                continue;
            }
            let mut inner = clause.walk();
            for spec in clause.named_children(&mut inner) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let Some(name) = self.field_text(spec, "name") else {
                    continue;
                };
                match self.field_text(spec, "alias") {
                    Some(alias) => {
                        let is_default = alias == "default";
                        self.push_export(alias, Some(name), is_default)
                    }
                    None => self.push_export(name, None, false),
                }
            }
        }
    }

    /// `export { a } from './x'`, `export * from './x'`, `export * as ns from './x'`
    fn reexport(&mut self, node: Node, specifier: String) {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "export_clause" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let Some(name) = self.field_text(spec, "name") else {
                            continue;
                        };
                        let visible = self.field_text(spec, "alias").unwrap_or_else(|| name.clone());
                        names.push(name);
                        self.push_export(visible, None, false);
                    }
                }
                "namespace_export" => {
                    names.push("*".to_string());
                    if let Some(id) = child.named_child(0) {
                        self.push_export(unquote(self.text(id)), None, false);
                    }
                }
                _ => {}
            }
        }
        if names.is_empty() {
            names.push("*".to_string());
        }
        self.push_import(specifier, names, true, node);
    }

    fn push_export(&mut self, name: String, local_name: Option<String>, is_default: bool) {
        self.out.exports.push(RawExport { name, local_name, is_default });
    }

    // ── Declarations ────────────────────────────────────────

    /// Record a top-level declaration; returns the names it binds.
    fn declaration(&mut self, node: Node) -> Vec<String> {
        match node.kind() {
            "function_declaration" | "generator_function_declaration" => {
                let Some(name) = self.field_text(node, "name") else {
                    return Vec::new();
                };
                self.push_function(name.clone(), node, node, node.child_by_field_name("body"));
                vec![name]
            }
            "class_declaration" | "abstract_class_declaration" => {
                let Some(name) = self.field_text(node, "name") else {
                    return Vec::new();
                };
                self.out.classes.push(symbol(name.clone(), node, None));
                vec![name]
            }
            "interface_declaration" | "type_alias_declaration" | "enum_declaration" => {
                let Some(name) = self.field_text(node, "name") else {
                    return Vec::new();
                };
                self.out.types.push(symbol(name.clone(), node, None));
                vec![name]
            }
            "lexical_declaration" | "variable_declaration" => self.variables(node),
            "ambient_declaration" => node.named_child(0).map(|inner| self.declaration(inner)).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn variables(&mut self, node: Node) -> Vec<String> {
        let is_const = node.child(0).is_some_and(|kw| self.text(kw) == "const");
        let mut declared = Vec::new();

        let mut cursor = node.walk();
        for declarator in node.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(binding) = declarator.child_by_field_name("name") else {
                continue;
            };
            let value = declarator.child_by_field_name("value");

            if let Some(specifier) = value.and_then(|v| self.require_specifier(v)) {
                let names = self.pattern_names(binding);
                self.push_import(specifier, names, false, node);
                continue;
            }

            if binding.kind() != "identifier" {
                continue;
            }
            let name = self.text(binding).to_string();
            match value {
                Some(v) if is_function_value(v) => {
                    self.push_function(name.clone(), node, node, v.child_by_field_name("body"));
                }
                _ if is_const => self.out.constants.push(symbol(name.clone(), node, None)),
                _ => {}
            }
            declared.push(name);
        }
        declared
    }

    /// Names bound by `const x = require(..)` or `const { a, b: c } = require(..)`.
    fn pattern_names(&self, binding: Node) -> Vec<String> {
        match binding.kind() {
            "identifier" => vec!["default".to_string()],
            "object_pattern" => {
                let mut cursor = binding.walk();
                binding
                    .named_children(&mut cursor)
                    .filter_map(|prop| match prop.kind() {
                        "shorthand_property_identifier_pattern" => Some(self.text(prop).to_string()),
                        "pair_pattern" => self.field_text(prop, "key"),
                        _ => None,
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// `span` gives the line range, `head` the start of the signature text.
    fn push_function(&mut self, name: String, span: Node, head: Node, body: Option<Node>) {
        let signature = self.signature(head, body);
        self.out.functions.push(symbol(name, span, signature));
    }

    /// Declaration text up to (not including) the body, whitespace collapsed.
    fn signature(&self, head: Node, body: Option<Node>) -> Option<String> {
        let start = head.start_byte();
        let end = body.map_or(head.end_byte(), |b| b.start_byte());
        let raw = self.source.get(start..end)?;
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let trimmed = collapsed.trim_end_matches('{').trim_end();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.chars().take(MAX_SIGNATURE_CHARS).collect())
    }
}

fn symbol(name: String, span: Node, signature: Option<String>) -> RawSymbol {
    RawSymbol {
        name,
        line_start: start_line(span),
        line_end: end_line(span),
        signature,
    }
}

fn has_token(node: Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

fn is_function_value(node: Node) -> bool {
    matches!(
        node.kind(),
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}

fn start_line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line(node: Node) -> u32 {
    node.end_position().row as u32 + 1
}

fn unquote(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

/// Comment block at the head of the file, above the first statement.
fn leading_doc_comment(root: Node, source: &str) -> Option<String> {
    let mut lines = Vec::new();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "hash_bang_line" => continue,
            "comment" => {
                let raw = node.utf8_text(source.as_bytes()).unwrap_or("");
                lines.extend(clean_comment(raw));
            }
            _ => break,
        }
    }
    let doc = lines.join("\n");
    (!doc.trim().is_empty()).then_some(doc)
}

fn clean_comment(raw: &str) -> Vec<String> {
    let body = if let Some(block) = raw.strip_prefix("/*") {
        block.trim_start_matches('*').trim_end_matches("*/")
    } else {
        raw.trim_start_matches('/')
    };
    body.lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
