use crate::core::{Query, Table};
use crate::domain::model::{scalar_to_string, Scalar};
use crate::utils::error::{LookupError, Result};

pub const ENTITY_TOKEN: &str = "{entity}";
pub const DEFAULT_TEMPLATE: &str = "Get me the email address of {entity}";
pub const PREVIEW_LIMIT: usize = 5;

/// A query template containing at least one `{entity}` token.
///
/// Rendering replaces every occurrence of the token, not only the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate(String);

impl QueryTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        if !template.contains(ENTITY_TOKEN) {
            return Err(LookupError::ValidationError {
                message: format!(
                    "query template must contain the {} placeholder: '{}'",
                    ENTITY_TOKEN, template
                ),
            });
        }
        Ok(Self(template.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, entity: &Scalar) -> Query {
        Query::new(self.0.replace(ENTITY_TOKEN, &scalar_to_string(entity)))
    }
}

impl Default for QueryTemplate {
    fn default() -> Self {
        Self(DEFAULT_TEMPLATE.to_string())
    }
}

/// One query per row, in row order.
pub fn build_queries(table: &Table, column: &str, template: &QueryTemplate) -> Result<Vec<Query>> {
    let queries: Vec<Query> = table
        .column_values(column)?
        .iter()
        .map(|entity| template.render(entity))
        .collect();

    tracing::debug!("Built {} queries from column '{}'", queries.len(), column);
    Ok(queries)
}

pub fn preview_queries(
    table: &Table,
    column: &str,
    template: &QueryTemplate,
    limit: usize,
) -> Result<Vec<Query>> {
    build_queries(&table.head(limit), column, template)
}
