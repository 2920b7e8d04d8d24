use super::{class_signature, extract_docstring, function_signature, line_of, node_text, span};
use crate::model::{
    CALLS, Edge, Entity, INHERITS, KIND_CLASS, KIND_FUNCTION, KIND_METHOD, MUTATES,
    PROPAGATES_ERROR, READS_CONFIG,
};
use tree_sitter::Node;

const MUTATING_METHODS: &[&str] = &[
    "append", "extend", "insert", "update", "add", "remove", "pop", "clear", "discard",
];

/// Entities and edges extracted from one source file.
pub struct ParsedFile {
    pub file_path: String,
    pub entities: Vec<Entity>,
    pub edges: Vec<Edge>,
}

pub(super) fn extract(root: Node<'_>, file_path: &str, source: &str) -> ParsedFile {
    let mut entities = Vec::new();
    walk_entities(root, None, file_path, source, &mut entities);

    let mut walker = EdgeWalker {
        file_path,
        source,
        scopes: Vec::new(),
        handlers: Vec::new(),
        edges: Vec::new(),
    };
    walker.walk(root);

    ParsedFile {
        file_path: file_path.to_string(),
        entities,
        edges: walker.edges,
    }
}

// Entity pass. Function bodies are opaque: a def nested inside a def
// never becomes an entity. Class children are walked with the class
// name as parent so methods pick up the `Class.name` qualification.
fn walk_entities(
    node: Node<'_>,
    parent_class: Option<&str>,
    file_path: &str,
    source: &str,
    out: &mut Vec<Entity>,
) {
    match node.kind() {
        "function_definition" => {
            if let Some(entity) = function_entity(node, parent_class, file_path, source) {
                out.push(entity);
            }
        }
        "class_definition" => {
            if let Some(entity) = class_entity(node, file_path, source) {
                let class_name = entity.name.clone();
                out.push(entity);
                let mut cursor = node.walk();
                for child in node.named_children(&mut cursor) {
                    walk_entities(child, Some(&class_name), file_path, source, out);
                }
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                walk_entities(child, parent_class, file_path, source, out);
            }
        }
    }
}

fn function_entity(
    node: Node<'_>,
    parent_class: Option<&str>,
    file_path: &str,
    source: &str,
) -> Option<Entity> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let (id, kind) = match parent_class {
        Some(class_name) => (
            format!("method:{file_path}:{class_name}.{name}"),
            KIND_METHOD,
        ),
        None => (format!("func:{file_path}:{name}"), KIND_FUNCTION),
    };
    let signature = function_signature(node, &name, source);
    let docstring = extract_docstring(node, source);
    let (start_line, end_line) = span(node);
    Some(Entity {
        id,
        kind: kind.to_string(),
        file_path: file_path.to_string(),
        name,
        start_line,
        end_line,
        signature: Some(signature),
        docstring,
        last_updated: 0.0,
    })
}

fn class_entity(node: Node<'_>, file_path: &str, source: &str) -> Option<Entity> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let signature = class_signature(node, &name, source);
    let docstring = extract_docstring(node, source);
    let (start_line, end_line) = span(node);
    Some(Entity {
        id: format!("class:{file_path}:{name}"),
        kind: KIND_CLASS.to_string(),
        file_path: file_path.to_string(),
        name,
        start_line,
        end_line,
        signature: Some(signature),
        docstring,
        last_updated: 0.0,
    })
}

struct Scope {
    is_class: bool,
    id: String,
    name: String,
}

struct Handler {
    caught: Vec<String>,
    alias: Option<String>,
}

// Edge pass. The enclosing-entity stack and the except-handler stack
// are explicit state; module-level statements have no enclosing scope
// and emit nothing.
struct EdgeWalker<'a> {
    file_path: &'a str,
    source: &'a str,
    scopes: Vec<Scope>,
    handlers: Vec<Handler>,
    edges: Vec<Edge>,
}

impl EdgeWalker<'_> {
    fn walk(&mut self, node: Node<'_>) {
        match node.kind() {
            "function_definition" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source);
                    let id = match self.scopes.last() {
                        Some(scope) if scope.is_class => {
                            format!("method:{}:{}.{}", self.file_path, scope.name, name)
                        }
                        _ => format!("func:{}:{}", self.file_path, name),
                    };
                    self.scopes.push(Scope {
                        is_class: false,
                        id,
                        name,
                    });
                    self.walk_children(node);
                    self.scopes.pop();
                    return;
                }
            }
            "class_definition" => {
                if let Some(name_node) = node.child_by_field_name("name") {
                    let name = node_text(name_node, self.source);
                    let id = format!("class:{}:{}", self.file_path, name);
                    if let Some(super_node) = node.child_by_field_name("superclasses") {
                        let mut cursor = super_node.walk();
                        let mut bases = Vec::new();
                        for child in super_node.named_children(&mut cursor) {
                            if child.kind() == "identifier" {
                                bases.push(node_text(child, self.source));
                            }
                        }
                        for base in bases {
                            let target = format!("class:{}:{}", self.file_path, base);
                            self.push_edge(id.clone(), INHERITS, target, None);
                        }
                    }
                    self.scopes.push(Scope {
                        is_class: true,
                        id,
                        name,
                    });
                    self.walk_children(node);
                    self.scopes.pop();
                    return;
                }
            }
            "call" => self.handle_call(node),
            "assignment" | "augmented_assignment" => self.handle_assignment(node),
            "subscript" => self.handle_environ_subscript(node),
            "identifier" => self.handle_constant_read(node),
            "raise_statement" => self.handle_raise(node),
            "except_clause" => {
                let handler = parse_handler(node, self.source);
                self.handlers.push(handler);
                self.walk_children(node);
                self.handlers.pop();
                return;
            }
            _ => {}
        }
        self.walk_children(node);
    }

    fn walk_children(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child);
        }
    }

    fn source_id(&self) -> Option<String> {
        self.scopes.last().map(|scope| scope.id.clone())
    }

    fn push_edge(&mut self, source_id: String, relation: &str, target_id: String, context: Option<String>) {
        self.edges.push(Edge {
            source_id,
            relation: relation.to_string(),
            target_id,
            context,
        });
    }

    fn handle_call(&mut self, node: Node<'_>) {
        let Some(caller_id) = self.source_id() else {
            return;
        };
        let Some(func_node) = node.child_by_field_name("function") else {
            return;
        };

        match func_node.kind() {
            "identifier" => {
                let callee = node_text(func_node, self.source);
                let target = format!("func:{}:{}", self.file_path, callee);
                self.push_edge(caller_id, CALLS, target, None);
            }
            "attribute" => {
                let Some(attr_node) = func_node.child_by_field_name("attribute") else {
                    return;
                };
                let method_name = node_text(attr_node, self.source);
                let target = format!("method:{}:*.{}", self.file_path, method_name);
                self.push_edge(caller_id.clone(), CALLS, target, None);

                let obj_node = func_node.child_by_field_name("object");

                if MUTATING_METHODS.contains(&method_name.as_str()) {
                    if let Some(obj) = obj_node {
                        let line = line_of(func_node);
                        match obj.kind() {
                            "identifier" => {
                                let obj_name = node_text(obj, self.source);
                                let target = format!("var:{}:{}", self.file_path, obj_name);
                                self.push_edge(
                                    caller_id.clone(),
                                    MUTATES,
                                    target,
                                    Some(format!("line:{line} type:method_call")),
                                );
                            }
                            "attribute" => {
                                if let Some(sub_attr) = obj.child_by_field_name("attribute") {
                                    let sub_name = node_text(sub_attr, self.source);
                                    let target = format!("attr:{}:{}", self.file_path, sub_name);
                                    self.push_edge(
                                        caller_id.clone(),
                                        MUTATES,
                                        target,
                                        Some(format!("line:{line} type:method_call")),
                                    );
                                }
                            }
                            _ => {}
                        }
                    }
                }

                // os.getenv("X")
                if method_name == "getenv" {
                    if let Some(obj) = obj_node {
                        if obj.kind() == "identifier" && node_text(obj, self.source) == "os" {
                            if let Some(env_var) = first_string_argument(node, self.source) {
                                let line = line_of(node);
                                let target = format!("config:env:{env_var}");
                                self.push_edge(
                                    caller_id,
                                    READS_CONFIG,
                                    target,
                                    Some(format!("line:{line} via:os.getenv")),
                                );
                            }
                        }
                    }
                } else if method_name == "get" {
                    // os.environ.get("X")
                    if let Some(obj) = obj_node {
                        if obj.kind() == "attribute" {
                            let sub_obj = obj.child_by_field_name("object");
                            let sub_attr = obj.child_by_field_name("attribute");
                            if let (Some(sub_obj), Some(sub_attr)) = (sub_obj, sub_attr) {
                                if node_text(sub_obj, self.source) == "os"
                                    && node_text(sub_attr, self.source) == "environ"
                                {
                                    if let Some(env_var) = first_string_argument(node, self.source)
                                    {
                                        let line = line_of(node);
                                        let target = format!("config:env:{env_var}");
                                        self.push_edge(
                                            caller_id,
                                            READS_CONFIG,
                                            target,
                                            Some(format!("line:{line} via:os.environ.get")),
                                        );
                                    }
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn handle_assignment(&mut self, node: Node<'_>) {
        let Some(source_id) = self.source_id() else {
            return;
        };
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        let mut_type = node.kind();
        match left.kind() {
            "identifier" => {
                let var_name = node_text(left, self.source);
                let line = line_of(left);
                let target = format!("var:{}:{}", self.file_path, var_name);
                self.push_edge(
                    source_id,
                    MUTATES,
                    target,
                    Some(format!("line:{line} type:{mut_type}")),
                );
            }
            "attribute" => {
                if let Some(attr_node) = left.child_by_field_name("attribute") {
                    let attr_name = node_text(attr_node, self.source);
                    let line = line_of(left);
                    let target = format!("attr:{}:{}", self.file_path, attr_name);
                    self.push_edge(
                        source_id,
                        MUTATES,
                        target,
                        Some(format!("line:{line} type:{mut_type}")),
                    );
                }
            }
            _ => {}
        }
    }

    // os.environ["X"]
    fn handle_environ_subscript(&mut self, node: Node<'_>) {
        let Some(source_id) = self.source_id() else {
            return;
        };
        let Some(value_node) = node.child_by_field_name("value") else {
            return;
        };
        if value_node.kind() != "attribute" {
            return;
        }
        let obj_node = value_node.child_by_field_name("object");
        let attr_node = value_node.child_by_field_name("attribute");
        let (Some(obj_node), Some(attr_node)) = (obj_node, attr_node) else {
            return;
        };
        if node_text(obj_node, self.source) != "os"
            || node_text(attr_node, self.source) != "environ"
        {
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "string" {
                if let Some(env_var) = string_content(child, self.source) {
                    let line = line_of(node);
                    let target = format!("config:env:{env_var}");
                    self.push_edge(
                        source_id,
                        READS_CONFIG,
                        target,
                        Some(format!("line:{line} via:os.environ[]")),
                    );
                }
                return;
            }
        }
    }

    // Bare SCREAMING_CASE reads inside an entity are constant reads,
    // except when the identifier sits directly in a def/class/import
    // header.
    fn handle_constant_read(&mut self, node: Node<'_>) {
        let Some(source_id) = self.source_id() else {
            return;
        };
        let name = node_text(node, self.source);
        if !is_screaming_const(&name) {
            return;
        }
        let Some(parent) = node.parent() else {
            return;
        };
        if matches!(
            parent.kind(),
            "class_definition" | "function_definition" | "import_from_statement"
        ) {
            return;
        }
        let line = line_of(node);
        let target = format!("config:const:{name}");
        self.push_edge(
            source_id,
            READS_CONFIG,
            target,
            Some(format!("line:{line} via:constant")),
        );
    }

    fn handle_raise(&mut self, node: Node<'_>) {
        let Some(source_id) = self.source_id() else {
            return;
        };
        let line = line_of(node);
        let cause = node.child_by_field_name("cause");

        let mut raised = None;
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "comment" {
                continue;
            }
            if let Some(cause_node) = cause {
                if child.id() == cause_node.id() {
                    continue;
                }
            }
            raised = Some(child);
            break;
        }

        match raised {
            Some(expr) => {
                if let Some(name) = exception_name(expr, self.source) {
                    self.push_edge(
                        source_id.clone(),
                        PROPAGATES_ERROR,
                        format!("exc:{name}"),
                        Some(format!("line:{line} via:raise")),
                    );
                }
                if let Some(cause_node) = cause {
                    for name in self.cause_names(cause_node) {
                        self.push_edge(
                            source_id.clone(),
                            PROPAGATES_ERROR,
                            format!("exc:{name}"),
                            Some(format!("line:{line} via:chain")),
                        );
                    }
                }
            }
            None => {
                // Bare raise re-throws whatever the innermost handler caught.
                let caught: Vec<String> = self
                    .handlers
                    .last()
                    .map(|handler| handler.caught.clone())
                    .unwrap_or_default();
                for name in caught {
                    self.push_edge(
                        source_id.clone(),
                        PROPAGATES_ERROR,
                        format!("exc:{name}"),
                        Some(format!("line:{line} via:reraise")),
                    );
                }
            }
        }
    }

    // `raise X from Y`: the chained cause is recorded when Y is a
    // constructor call, an uppercase-initial class name, or the
    // enclosing handler's alias (which stands for the caught types).
    fn cause_names(&self, cause: Node<'_>) -> Vec<String> {
        match cause.kind() {
            "call" => exception_name(cause, self.source).into_iter().collect(),
            "identifier" => {
                let name = node_text(cause, self.source);
                if let Some(handler) = self.handlers.last() {
                    if handler.alias.as_deref() == Some(name.as_str()) {
                        return handler.caught.clone();
                    }
                }
                if name.chars().next().is_some_and(|c| c.is_uppercase()) {
                    vec![name]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }
}

fn exception_name(expr: Node<'_>, source: &str) -> Option<String> {
    match expr.kind() {
        "call" => {
            let func = expr.child_by_field_name("function")?;
            match func.kind() {
                "identifier" => Some(node_text(func, source)),
                "attribute" => func
                    .child_by_field_name("attribute")
                    .map(|n| node_text(n, source)),
                _ => None,
            }
        }
        "identifier" => Some(node_text(expr, source)),
        "attribute" => expr
            .child_by_field_name("attribute")
            .map(|n| node_text(n, source)),
        _ => None,
    }
}

fn parse_handler(node: Node<'_>, source: &str) -> Handler {
    let mut caught = Vec::new();
    let mut alias = None;

    let mut named = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "comment" || child.kind() == "block" {
            continue;
        }
        named.push(child);
    }

    if let Some(first) = named.first() {
        if first.kind() == "as_pattern" {
            if let Some(expr) = first.named_child(0) {
                collect_exception_types(expr, source, &mut caught);
            }
            if let Some(alias_node) = first.child_by_field_name("alias") {
                alias = Some(node_text(alias_node, source));
            }
        } else {
            collect_exception_types(*first, source, &mut caught);
            if let Some(second) = named.get(1) {
                if second.kind() == "identifier" {
                    alias = Some(node_text(*second, source));
                }
            }
        }
    }

    Handler { caught, alias }
}

fn collect_exception_types(expr: Node<'_>, source: &str, out: &mut Vec<String>) {
    match expr.kind() {
        "identifier" => out.push(node_text(expr, source)),
        "attribute" => {
            if let Some(attr) = expr.child_by_field_name("attribute") {
                out.push(node_text(attr, source));
            }
        }
        "tuple" | "parenthesized_expression" => {
            let mut cursor = expr.walk();
            for child in expr.named_children(&mut cursor) {
                collect_exception_types(child, source, out);
            }
        }
        _ => {}
    }
}

fn first_string_argument(call: Node<'_>, source: &str) -> Option<String> {
    let args = call.child_by_field_name("arguments")?;
    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        if arg.kind() == "string" {
            return string_content(arg, source);
        }
    }
    None
}

fn string_content(string_node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = string_node.walk();
    for part in string_node.named_children(&mut cursor) {
        if part.kind() == "string_content" {
            return Some(node_text(part, source));
        }
    }
    None
}

fn is_screaming_const(name: &str) -> bool {
    name.chars().count() > 2
        && name.contains('_')
        && name.chars().any(|c| c.is_uppercase())
        && !name.chars().any(|c| c.is_lowercase())
}

#[cfg(test)]
mod tests {
    use super::super::PythonParser;
    use crate::model::{CALLS, Edge, INHERITS, MUTATES, PROPAGATES_ERROR, READS_CONFIG};

    fn parse(source: &str) -> super::ParsedFile {
        let mut parser = PythonParser::new().unwrap();
        parser.parse_source("app.py", source).unwrap()
    }

    fn edges_with(edges: &[Edge], relation: &str) -> Vec<Edge> {
        edges
            .iter()
            .filter(|e| e.relation == relation)
            .cloned()
            .collect()
    }

    #[test]
    fn extracts_functions_methods_and_classes() {
        let source = r#"
def login(username, password) -> bool:
    """Authenticate a user."""
    return True

class Session(Base):
    """A login session."""

    def refresh(self):
        pass
"#;
        let parsed = parse(source);
        let ids: Vec<&str> = parsed.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "func:app.py:login",
                "class:app.py:Session",
                "method:app.py:Session.refresh",
            ]
        );

        let login = &parsed.entities[0];
        assert_eq!(login.kind, "function");
        assert_eq!(
            login.signature.as_deref(),
            Some("def login(username, password) -> bool")
        );
        assert_eq!(login.docstring.as_deref(), Some("Authenticate a user."));
        assert_eq!(login.start_line, 2);

        let session = &parsed.entities[1];
        assert_eq!(session.kind, "class");
        assert_eq!(session.signature.as_deref(), Some("class Session(Base)"));
        assert_eq!(session.docstring.as_deref(), Some("A login session."));

        let refresh = &parsed.entities[2];
        assert_eq!(refresh.kind, "method");
        assert_eq!(refresh.name, "refresh");
    }

    #[test]
    fn nested_defs_are_not_entities() {
        let source = r#"
def outer():
    def inner():
        pass
    return inner
"#;
        let parsed = parse(source);
        let ids: Vec<&str> = parsed.entities.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["func:app.py:outer"]);
    }

    #[test]
    fn calls_use_wildcard_for_attribute_receivers() {
        let source = r#"
def handler(db):
    validate()
    db.commit()
"#;
        let parsed = parse(source);
        let calls = edges_with(&parsed.edges, CALLS);
        assert!(
            calls
                .iter()
                .any(|e| e.source_id == "func:app.py:handler"
                    && e.target_id == "func:app.py:validate")
        );
        assert!(
            calls
                .iter()
                .any(|e| e.source_id == "func:app.py:handler"
                    && e.target_id == "method:app.py:*.commit")
        );
    }

    #[test]
    fn module_level_statements_emit_nothing() {
        let source = r#"
setup()
x = compute()
"#;
        let parsed = parse(source);
        assert!(parsed.edges.is_empty());
    }

    #[test]
    fn inherits_one_edge_per_identifier_base() {
        let source = r#"
class Admin(User, Auditable):
    pass
"#;
        let parsed = parse(source);
        let inherits = edges_with(&parsed.edges, INHERITS);
        let targets: Vec<&str> = inherits.iter().map(|e| e.target_id.as_str()).collect();
        assert_eq!(targets, vec!["class:app.py:User", "class:app.py:Auditable"]);
        assert!(inherits.iter().all(|e| e.source_id == "class:app.py:Admin"));
        assert!(inherits.iter().all(|e| e.context.is_none()));
    }

    #[test]
    fn assignment_mutations_carry_line_and_type() {
        let source = r#"
def update_counts(self, key):
    total = 0
    total += 1
    self.count = total
"#;
        let parsed = parse(source);
        let mutates = edges_with(&parsed.edges, MUTATES);
        assert!(mutates.iter().any(|e| {
            e.target_id == "var:app.py:total"
                && e.context.as_deref() == Some("line:3 type:assignment")
        }));
        assert!(mutates.iter().any(|e| {
            e.target_id == "var:app.py:total"
                && e.context.as_deref() == Some("line:4 type:augmented_assignment")
        }));
        assert!(mutates.iter().any(|e| {
            e.target_id == "attr:app.py:count"
                && e.context.as_deref() == Some("line:5 type:assignment")
        }));
    }

    #[test]
    fn mutating_method_calls_mark_receivers() {
        let source = r#"
def enqueue(self, item):
    pending.append(item)
    self.cache.update(item)
"#;
        let parsed = parse(source);
        let mutates = edges_with(&parsed.edges, MUTATES);
        assert!(mutates.iter().any(|e| {
            e.target_id == "var:app.py:pending"
                && e.context.as_deref() == Some("line:3 type:method_call")
        }));
        assert!(mutates.iter().any(|e| {
            e.target_id == "attr:app.py:cache"
                && e.context.as_deref() == Some("line:4 type:method_call")
        }));
        // the call itself still counts as a wildcard method call
        let calls = edges_with(&parsed.edges, CALLS);
        assert!(calls.iter().any(|e| e.target_id == "method:app.py:*.append"));
    }

    #[test]
    fn env_reads_cover_all_three_access_forms() {
        let source = r#"
def load_settings():
    host = os.getenv("DB_HOST")
    port = os.environ.get("DB_PORT")
    secret = os.environ["SECRET_KEY"]
"#;
        let parsed = parse(source);
        let reads = edges_with(&parsed.edges, READS_CONFIG);
        assert!(reads.iter().any(|e| {
            e.target_id == "config:env:DB_HOST"
                && e.context.as_deref() == Some("line:3 via:os.getenv")
        }));
        assert!(reads.iter().any(|e| {
            e.target_id == "config:env:DB_PORT"
                && e.context.as_deref() == Some("line:4 via:os.environ.get")
        }));
        assert!(reads.iter().any(|e| {
            e.target_id == "config:env:SECRET_KEY"
                && e.context.as_deref() == Some("line:5 via:os.environ[]")
        }));
    }

    #[test]
    fn getenv_default_value_is_not_a_read() {
        let source = r#"
def load():
    return os.getenv("HOME", "/tmp")
"#;
        let parsed = parse(source);
        let reads = edges_with(&parsed.edges, READS_CONFIG);
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].target_id, "config:env:HOME");
    }

    #[test]
    fn screaming_constants_are_config_reads() {
        let source = r#"
def retry():
    for _ in range(MAX_RETRIES):
        wait(RETRY_DELAY_MS)
"#;
        let parsed = parse(source);
        let reads = edges_with(&parsed.edges, READS_CONFIG);
        assert!(reads.iter().any(|e| e.target_id == "config:const:MAX_RETRIES"
            && e.context.as_deref() == Some("line:3 via:constant")));
        assert!(
            reads
                .iter()
                .any(|e| e.target_id == "config:const:RETRY_DELAY_MS")
        );
    }

    #[test]
    fn short_or_lowercase_names_are_not_constants() {
        let source = r#"
def f():
    use(ABC)
    use(max_retries)
    use(X_)
"#;
        let parsed = parse(source);
        let reads = edges_with(&parsed.edges, READS_CONFIG);
        assert!(reads.is_empty());
    }

    #[test]
    fn explicit_raise_emits_error_edge() {
        let source = r#"
def validate(data):
    if not data:
        raise ValidationError("Empty data")
"#;
        let parsed = parse(source);
        let errors = edges_with(&parsed.edges, PROPAGATES_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source_id, "func:app.py:validate");
        assert_eq!(errors[0].target_id, "exc:ValidationError");
        assert_eq!(errors[0].context.as_deref(), Some("line:4 via:raise"));
    }

    #[test]
    fn bare_raise_rethrows_caught_types() {
        let source = r#"
def wrapper():
    try:
        work()
    except Exception as e:
        log(e)
        raise
"#;
        let parsed = parse(source);
        let errors = edges_with(&parsed.edges, PROPAGATES_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].target_id, "exc:Exception");
        assert_eq!(errors[0].context.as_deref(), Some("line:7 via:reraise"));
    }

    #[test]
    fn bare_raise_with_tuple_handler_emits_each_type() {
        let source = r#"
def wrapper():
    try:
        work()
    except (ValueError, KeyError):
        raise
"#;
        let parsed = parse(source);
        let errors = edges_with(&parsed.edges, PROPAGATES_ERROR);
        let targets: Vec<&str> = errors.iter().map(|e| e.target_id.as_str()).collect();
        assert!(targets.contains(&"exc:ValueError"));
        assert!(targets.contains(&"exc:KeyError"));
    }

    #[test]
    fn chained_raise_records_both_exceptions() {
        let source = r#"
def process(data):
    try:
        transform(data)
    except ValueError as e:
        raise ProcessError("Failed to process") from e
"#;
        let parsed = parse(source);
        let errors = edges_with(&parsed.edges, PROPAGATES_ERROR);
        assert!(errors.iter().any(|e| {
            e.target_id == "exc:ProcessError" && e.context.as_deref() == Some("line:6 via:raise")
        }));
        assert!(errors.iter().any(|e| {
            e.target_id == "exc:ValueError" && e.context.as_deref() == Some("line:6 via:chain")
        }));
    }

    #[test]
    fn raises_in_nested_functions_attribute_to_the_inner_def() {
        let source = r#"
def outer():
    def inner():
        raise RuntimeError("inner")
    return inner
"#;
        let parsed = parse(source);
        let errors = edges_with(&parsed.edges, PROPAGATES_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].source_id, "func:app.py:inner");
        assert_eq!(errors[0].target_id, "exc:RuntimeError");
    }

    #[test]
    fn multiple_raises_emit_multiple_edges() {
        let source = r#"
def check(user):
    if user is None:
        raise ValueError("User is None")
    if not user.email:
        raise ValidationError("Missing email")
    if not user.active:
        raise PermissionError("User is inactive")
"#;
        let parsed = parse(source);
        let errors = edges_with(&parsed.edges, PROPAGATES_ERROR);
        assert_eq!(errors.len(), 3);
        let targets: Vec<&str> = errors.iter().map(|e| e.target_id.as_str()).collect();
        assert!(targets.contains(&"exc:ValueError"));
        assert!(targets.contains(&"exc:ValidationError"));
        assert!(targets.contains(&"exc:PermissionError"));
    }

    #[test]
    fn dotted_exception_uses_attribute_name() {
        let source = r#"
def fail():
    raise errors.TimeoutError("slow")
"#;
        let parsed = parse(source);
        let errors = edges_with(&parsed.edges, PROPAGATES_ERROR);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].target_id, "exc:TimeoutError");
    }

    #[test]
    fn class_level_statements_attribute_to_the_class() {
        let source = r#"
class Registry:
    entries = make_default()
"#;
        let parsed = parse(source);
        let calls = edges_with(&parsed.edges, CALLS);
        assert!(calls.iter().any(|e| {
            e.source_id == "class:app.py:Registry" && e.target_id == "func:app.py:make_default"
        }));
    }
}
