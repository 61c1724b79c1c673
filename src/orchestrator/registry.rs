//! Maps entity names to parser constructors and groups them into the
//! dependency phases the orchestrator runs in order.

use crate::parsers::{
    AuthorParser, ConceptParser, EntityParser, FunderParser, InstitutionParser, PublisherParser,
    SourceParser, TopicParser, WorkParser,
};

pub type ParserCtor = fn(usize) -> Box<dyn EntityParser>;

/// parallel, independent: no relationship table in this phase references
/// another entity still being loaded.
pub fn phase_r1() -> Vec<(&'static str, ParserCtor)> {
    vec![
        ("topics", (|n| Box::new(TopicParser::new(n))) as ParserCtor),
        ("concepts", |n| Box::new(ConceptParser::new(n))),
        ("publishers", |n| Box::new(PublisherParser::new(n))),
        ("funders", |n| Box::new(FunderParser::new(n))),
    ]
}

/// parallel, depends on R1 (sources reference publishers). Authors joins
/// this phase when enabled — it depends on nothing, so it costs nothing to
/// run alongside these.
pub fn phase_r2(authors_enabled: bool) -> Vec<(&'static str, ParserCtor)> {
    let mut entities: Vec<(&'static str, ParserCtor)> = vec![
        ("sources", |n| Box::new(SourceParser::new(n))),
        ("institutions", |n| Box::new(InstitutionParser::new(n))),
    ];
    if authors_enabled {
        entities.push(("authors", |n| Box::new(AuthorParser::new(n))));
    }
    entities
}

/// sequential, to bound memory and database pressure.
pub fn phase_m() -> Vec<(&'static str, ParserCtor)> {
    vec![("works", |n| Box::new(WorkParser::new(n)))]
}

/// every entity name the orchestrator knows how to run, for `status`.
pub fn all_entity_names(authors_enabled: bool) -> Vec<&'static str> {
    phase_r1()
        .into_iter()
        .chain(phase_r2(authors_enabled))
        .chain(phase_m())
        .map(|(name, _)| name)
        .collect()
}
