//! Parsed GraphQL operations.
//!
//! An [`Operation`] is a validated document plus the kind of its main
//! definition (the first operation definition in the document). Parsing is
//! the boundary where raw document strings from the UI runtime are checked.

use graphql_parser::query::{
    parse_query, Definition, Document, Field, OperationDefinition, Selection, SelectionSet,
};

/// Kind of a GraphQL operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Read operation (also the `{ ... }` shorthand).
    Query,
    /// Write operation.
    Mutation,
    /// Long-lived push operation.
    Subscription,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => write!(f, "query"),
            Self::Mutation => write!(f, "mutation"),
            Self::Subscription => write!(f, "subscription"),
        }
    }
}

/// Errors produced while parsing a document into an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// The document is not valid GraphQL.
    #[error("invalid GraphQL document: {0}")]
    Syntax(String),
    /// The document holds no operation definition (fragments only).
    #[error("document contains no operation definition")]
    NoOperation,
    /// The operation is valid but of the wrong kind for the caller.
    #[error("expected a {expected} operation, got a {actual}")]
    WrongKind {
        /// Kind the caller requires.
        expected: OperationKind,
        /// Kind found in the document.
        actual: OperationKind,
    },
}

/// A parsed GraphQL document with its main operation's kind and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    document: String,
    kind: OperationKind,
    name: Option<String>,
}

impl Operation {
    /// Parse `source` and classify its main operation.
    pub fn parse(source: &str) -> Result<Self, OperationError> {
        let document = parse_document(source)?;
        let (kind, name) = main_operation(&document).ok_or(OperationError::NoOperation)?;
        Ok(Self {
            document: source.to_string(),
            kind,
            name,
        })
    }

    /// Parse `source` and require a subscription.
    pub fn parse_subscription(source: &str) -> Result<Self, OperationError> {
        let operation = Self::parse(source)?;
        operation.expect_kind(OperationKind::Subscription)?;
        Ok(operation)
    }

    /// Fail unless this operation is of `expected` kind.
    pub fn expect_kind(&self, expected: OperationKind) -> Result<(), OperationError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(OperationError::WrongKind {
                expected,
                actual: self.kind,
            })
        }
    }

    /// Kind of the main operation.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Name of the main operation, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Document text as it will be sent.
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Returns `true` for subscriptions.
    pub fn is_subscription(&self) -> bool {
        self.kind == OperationKind::Subscription
    }

    /// Copy of this operation with `__typename` requested in every nested
    /// selection set, so each returned object carries its type tag.
    ///
    /// Root selection sets are left alone. The document is re-printed in
    /// canonical form.
    #[must_use]
    pub fn with_typename(&self) -> Self {
        let Ok(mut document) = parse_document(&self.document) else {
            return self.clone();
        };
        for definition in &mut document.definitions {
            match definition {
                Definition::Operation(operation) => {
                    inject_typename(root_selection_set(operation), true);
                }
                Definition::Fragment(fragment) => {
                    inject_typename(&mut fragment.selection_set, false);
                }
            }
        }
        Self {
            document: document.to_string(),
            kind: self.kind,
            name: self.name.clone(),
        }
    }
}

fn parse_document(source: &str) -> Result<Document<'_, String>, OperationError> {
    parse_query::<String>(source).map_err(|e| OperationError::Syntax(e.to_string()))
}

fn main_operation(document: &Document<'_, String>) -> Option<(OperationKind, Option<String>)> {
    document.definitions.iter().find_map(|definition| match definition {
        Definition::Operation(OperationDefinition::SelectionSet(_)) => {
            Some((OperationKind::Query, None))
        }
        Definition::Operation(OperationDefinition::Query(query)) => {
            Some((OperationKind::Query, query.name.clone()))
        }
        Definition::Operation(OperationDefinition::Mutation(mutation)) => {
            Some((OperationKind::Mutation, mutation.name.clone()))
        }
        Definition::Operation(OperationDefinition::Subscription(subscription)) => {
            Some((OperationKind::Subscription, subscription.name.clone()))
        }
        Definition::Fragment(_) => None,
    })
}

fn root_selection_set<'a, 'b>(
    operation: &'b mut OperationDefinition<'a, String>,
) -> &'b mut SelectionSet<'a, String> {
    match operation {
        OperationDefinition::SelectionSet(set) => set,
        OperationDefinition::Query(query) => &mut query.selection_set,
        OperationDefinition::Mutation(mutation) => &mut mutation.selection_set,
        OperationDefinition::Subscription(subscription) => &mut subscription.selection_set,
    }
}

const TYPENAME: &str = "__typename";

fn inject_typename(set: &mut SelectionSet<'_, String>, root: bool) {
    for item in &mut set.items {
        match item {
            Selection::Field(field) if !field.selection_set.items.is_empty() => {
                inject_typename(&mut field.selection_set, false);
            }
            Selection::InlineFragment(fragment) => {
                inject_typename(&mut fragment.selection_set, false);
            }
            _ => {}
        }
    }

    if root {
        return;
    }
    let present = set
        .items
        .iter()
        .any(|item| matches!(item, Selection::Field(field) if field.name == TYPENAME));
    if !present {
        set.items.push(Selection::Field(Field {
            position: set.span.0,
            alias: None,
            name: TYPENAME.to_string(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: SelectionSet {
                span: set.span,
                items: Vec::new(),
            },
        }));
    }
}
