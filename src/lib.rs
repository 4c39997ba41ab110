/**
 * curator-core: decomposition and context-curation engine for AI-native
 * software engineering workflows.
 *
 * Module map:
 * - `types` - the shared data model (§3)
 * - `error` - the eight-way error taxonomy used everywhere
 * - `secure_path` - path validation shared by every filesystem-touching component
 * - `config` - layered configuration (defaults, TOML file, environment)
 * - `llm_gateway` - the single chokepoint for model calls
 * - `code_map` - the code-map provider and its markdown parsers
 * - `artifact_parser` - PRD and task-list ingestion
 * - `intent` - pattern matching, LLM fallback, and the command dispatcher
 * - `decomposition` - the recursive task decomposition engine
 * - `curation` - the eight-phase context curation pipeline
 * - `xml_writer` - the context package's XML serialization
 * - `app` - the composition root; wires the above into one running instance
 */

pub mod app;
pub mod artifact_parser;
pub mod code_map;
pub mod config;
pub mod curation;
pub mod decomposition;
pub mod error;
pub mod intent;
pub mod llm_gateway;
pub mod secure_path;
pub mod types;
pub mod xml_writer;

pub use error::{Error, Result};
