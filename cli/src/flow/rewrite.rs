use std::collections::HashMap;

use pbench_core::api::CliError;
use regex::Regex;

/// Filters and rewrites forwarded queries.
#[derive(Debug, Default)]
pub struct QueryRewriter {
    excludes: Vec<Regex>,
    replaces: Vec<(Regex, String)>,
    schema_mapping: HashMap<String, String>,
}

fn compile(pattern: &str) -> Result<Regex, CliError> {
    Regex::new(pattern)
        .map_err(|e| CliError::Args(format!("invalid regular expression {pattern:?}: {e}")))
}

impl QueryRewriter {
    pub fn new(
        exclude: &[String],
        replace: &[String],
        schema_mapping: &[String],
    ) -> Result<Self, CliError> {
        if replace.len() % 2 != 0 {
            return Err(CliError::Args(format!(
                "replace expects pattern/replacement pairs, got {} values",
                replace.len()
            )));
        }
        if schema_mapping.len() % 2 != 0 {
            return Err(CliError::Args(format!(
                "schema mapping expects source,target pairs, got {} values",
                schema_mapping.len()
            )));
        }

        let excludes = exclude
            .iter()
            .map(|p| compile(p))
            .collect::<Result<Vec<_>, _>>()?;
        let replaces = replace
            .chunks(2)
            .map(|pair| Ok((compile(&pair[0])?, pair[1].clone())))
            .collect::<Result<Vec<_>, CliError>>()?;
        let schema_mapping = schema_mapping
            .chunks(2)
            .map(|pair| (pair[0].trim().to_string(), pair[1].trim().to_string()))
            .collect();

        Ok(Self {
            excludes,
            replaces,
            schema_mapping,
        })
    }

    /// False when any exclude pattern matches.
    pub fn should_forward(&self, sql: &str) -> bool {
        !self.excludes.iter().any(|re| re.is_match(sql))
    }

    /// Apply every replace pair in order. `$1` style references expand to
    /// capture groups.
    pub fn rewrite(&self, sql: &str) -> String {
        self.replaces
            .iter()
            .fold(sql.to_string(), |acc, (re, rep)| {
                re.replace_all(&acc, rep.as_str()).into_owned()
            })
    }

    pub fn map_schema(&self, schema: Option<&str>) -> Option<String> {
        schema.map(|s| {
            self.schema_mapping
                .get(s)
                .cloned()
                .unwrap_or_else(|| s.to_string())
        })
    }
}
