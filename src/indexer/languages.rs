use tree_sitter::Language;

/// Node-type roles used to split a syntax tree into chunks.
///
/// * `context` nodes (package / import declarations) are merged into the file context.
/// * `primary` nodes become containers.
/// * `secondary` nodes become members of the innermost enclosing container, or
///   orphaned members of the file when no container encloses them.
pub struct NodeRoles {
    pub context: &'static [&'static str],
    pub primary: &'static [&'static str],
    pub secondary: &'static [&'static str],
}

/// Per-language table. Query fields hold one tree-sitter pattern per entry;
/// capture names are `@import`, `@module`, `@wildcard`, `@package`, `@extends`,
/// `@implements` and `@field_type`.
pub struct LanguageConfig {
    pub name: &'static str,
    pub language: Language,
    pub extensions: &'static [&'static str],
    pub roles: NodeRoles,
    /// Context node kinds that declare a package rather than an import.
    pub package_kinds: &'static [&'static str],
    /// Node kinds that mark a container as interface-like.
    pub interface_kinds: &'static [&'static str],
    /// Fields tried, in order, to find a declaration's name.
    pub name_fields: &'static [&'static str],
    pub return_type_fields: &'static [&'static str],
    pub import_patterns: &'static [&'static str],
    pub package_patterns: &'static [&'static str],
    pub heritage_patterns: &'static [&'static str],
    pub field_type_patterns: &'static [&'static str],
}

impl LanguageConfig {
    pub fn get_all() -> Vec<LanguageConfig> {
        vec![
            go_config(),
            python_config(),
            typescript_config(),
            javascript_config(),
            rust_config(),
        ]
    }

    pub fn get_by_extension(ext: &str) -> Option<LanguageConfig> {
        Self::get_all()
            .into_iter()
            .find(|c| c.extensions.contains(&ext))
    }

    pub fn get_by_name(name: &str) -> Option<LanguageConfig> {
        Self::get_all().into_iter().find(|c| c.name == name)
    }

    pub fn is_supported_extension(ext: &str) -> bool {
        Self::get_by_extension(ext).is_some()
    }

    pub fn is_context(&self, kind: &str) -> bool {
        self.roles.context.contains(&kind)
    }

    pub fn is_primary(&self, kind: &str) -> bool {
        self.roles.primary.contains(&kind)
    }

    pub fn is_secondary(&self, kind: &str) -> bool {
        self.roles.secondary.contains(&kind)
    }
}

fn go_config() -> LanguageConfig {
    LanguageConfig {
        name: "go",
        language: tree_sitter_go::LANGUAGE.into(),
        extensions: &["go"],
        roles: NodeRoles {
            context: &["package_clause", "import_declaration"],
            primary: &["type_declaration"],
            secondary: &[
                "function_declaration",
                "method_declaration",
                "method_elem",
                "method_spec",
            ],
        },
        package_kinds: &["package_clause"],
        interface_kinds: &["interface_type"],
        name_fields: &["name"],
        return_type_fields: &["result"],
        import_patterns: &["(import_spec path: (interpreted_string_literal) @import)"],
        package_patterns: &["(package_clause (package_identifier) @package)"],
        heritage_patterns: &[],
        field_type_patterns: &[
            "(field_declaration type: (type_identifier) @field_type)",
            "(field_declaration type: (pointer_type (type_identifier) @field_type))",
        ],
    }
}

fn python_config() -> LanguageConfig {
    LanguageConfig {
        name: "python",
        language: tree_sitter_python::LANGUAGE.into(),
        extensions: &["py"],
        roles: NodeRoles {
            context: &["import_statement", "import_from_statement"],
            primary: &["class_definition"],
            secondary: &["function_definition"],
        },
        package_kinds: &[],
        interface_kinds: &[],
        name_fields: &["name"],
        return_type_fields: &["return_type"],
        import_patterns: &[
            "(import_statement name: (dotted_name) @import)",
            "(import_statement name: (aliased_import name: (dotted_name) @import))",
            "(import_from_statement module_name: (dotted_name) @module name: (dotted_name) @import)",
            "(import_from_statement module_name: (dotted_name) @module (wildcard_import) @wildcard)",
        ],
        package_patterns: &[],
        heritage_patterns: &[
            "(class_definition superclasses: (argument_list (identifier) @extends))",
            "(class_definition superclasses: (argument_list (attribute) @extends))",
        ],
        field_type_patterns: &[],
    }
}

fn typescript_config() -> LanguageConfig {
    LanguageConfig {
        name: "typescript",
        language: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        extensions: &["ts", "tsx"],
        roles: NodeRoles {
            context: &["import_statement"],
            primary: &[
                "class_declaration",
                "abstract_class_declaration",
                "interface_declaration",
            ],
            secondary: &[
                "method_definition",
                "function_declaration",
                "method_signature",
                "abstract_method_signature",
            ],
        },
        package_kinds: &[],
        interface_kinds: &["interface_declaration", "abstract_class_declaration"],
        name_fields: &["name"],
        return_type_fields: &["return_type"],
        import_patterns: &["(import_statement source: (string) @import)"],
        package_patterns: &[],
        heritage_patterns: &[
            "(extends_clause value: (identifier) @extends)",
            "(implements_clause (type_identifier) @implements)",
            "(extends_type_clause (type_identifier) @extends)",
        ],
        field_type_patterns: &[
            "(public_field_definition (type_annotation (type_identifier) @field_type))",
        ],
    }
}

fn javascript_config() -> LanguageConfig {
    LanguageConfig {
        name: "javascript",
        language: tree_sitter_javascript::LANGUAGE.into(),
        extensions: &["js", "jsx"],
        roles: NodeRoles {
            context: &["import_statement"],
            primary: &["class_declaration"],
            secondary: &["method_definition", "function_declaration"],
        },
        package_kinds: &[],
        interface_kinds: &[],
        name_fields: &["name"],
        return_type_fields: &[],
        import_patterns: &["(import_statement source: (string) @import)"],
        package_patterns: &[],
        heritage_patterns: &["(class_heritage (identifier) @extends)"],
        field_type_patterns: &[],
    }
}

fn rust_config() -> LanguageConfig {
    LanguageConfig {
        name: "rust",
        language: tree_sitter_rust::LANGUAGE.into(),
        extensions: &["rs"],
        roles: NodeRoles {
            context: &["use_declaration"],
            primary: &[
                "impl_item",
                "trait_item",
                "struct_item",
                "enum_item",
                "mod_item",
            ],
            secondary: &["function_item", "function_signature_item"],
        },
        package_kinds: &[],
        interface_kinds: &["trait_item"],
        name_fields: &["name", "type"],
        return_type_fields: &["return_type"],
        import_patterns: &["(use_declaration argument: (_) @import)"],
        package_patterns: &[],
        heritage_patterns: &["(impl_item trait: (_) @implements)"],
        field_type_patterns: &[
            "(field_declaration type: (type_identifier) @field_type)",
            "(field_declaration type: (generic_type (type_arguments (type_identifier) @field_type)))",
        ],
    }
}
