//! Pest grammar for declarative schema files.

use pest_derive::Parser;

/// The declarative schema parser.
#[derive(Parser)]
#[grammar = "parser/strata.pest"]
pub struct DeclarativeParser;
