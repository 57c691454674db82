//! Command handlers

use std::path::PathBuf;

use anyhow::{Context, bail};
use colored::Colorize;
use morphic_engine::config::CONFIG_FILE;
use morphic_engine::{Engine, EngineConfig};
use morphic_forms::{FormMode, FormRequest};
use morphic_schema::{NewAttribute, NewEntity, NewRelationship};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{AttributeCommand, Cli, Command, EntityCommand, RecordCommand, RelationshipCommand};

pub(crate) fn execute(cli: Cli, config: EngineConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Init { force } => init(cli.config, config, force),
        Command::Entity(command) => entity(&Engine::open(config)?, command),
        Command::Attribute(command) => attribute(&Engine::open(config)?, command),
        Command::Relationship(command) => relationship(&Engine::open(config)?, command),
        Command::Record(command) => record(&Engine::open(config)?, command),
    }
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn status(message: impl std::fmt::Display) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

fn notice(message: impl std::fmt::Display) {
    eprintln!("{} {}", "•".yellow().bold(), message);
}

// ============================================================================
// init
// ============================================================================

fn init(path: Option<PathBuf>, config: EngineConfig, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    if path.exists() && !force {
        notice(format!("{} already exists, keeping it", path.display()));
    } else {
        std::fs::write(&path, config.to_toml_string()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        status(format!("Wrote {}", path.display()));
    }

    Engine::open(config.clone())?;
    status(format!("Database ready at {}", config.database.path.bold()));
    Ok(())
}

// ============================================================================
// entity
// ============================================================================

fn entity(engine: &Engine, command: EntityCommand) -> anyhow::Result<()> {
    match command {
        EntityCommand::Create {
            name,
            slug,
            description,
        } => {
            let mut input = NewEntity::new(name);
            if let Some(slug) = slug {
                input = input.with_slug(slug);
            }
            if let Some(description) = description {
                input = input.with_description(description);
            }
            let entity = engine.create_entity(input)?;
            status(format!("Created entity '{}'", entity.slug));
            print_json(&entity)
        }
        EntityCommand::List => print_json(&engine.list_entities()?),
        EntityCommand::Show { slug } => {
            let entity = engine.find_entity_by_slug(&slug)?;
            let attributes = engine.attributes_for_entity(entity.id)?;
            let relationships = engine.relationships_for_entity(entity.id)?;
            print_json(&json!({
                "entity": entity,
                "attributes": attributes,
                "relationships": relationships,
            }))
        }
        EntityCommand::Form { slug, mode, record } => {
            let entity = engine.find_entity_by_slug(&slug)?;
            let request = match (mode, record) {
                (FormMode::Create, _) => FormRequest::create(),
                (FormMode::Replace, Some(id)) => FormRequest::replace(id),
                (FormMode::Patch, Some(id)) => FormRequest::patch(id),
                (FormMode::Replace | FormMode::Patch, None) => {
                    bail!("--record is required with --mode {}", mode)
                }
            };
            print_json(&engine.generate_form_schema(entity.id, request)?)
        }
        EntityCommand::Delete { slug } => {
            let entity = engine.find_entity_by_slug(&slug)?;
            engine.delete_entity(entity.id)?;
            status(format!("Deleted entity '{}'", entity.slug));
            Ok(())
        }
    }
}

// ============================================================================
// attribute
// ============================================================================

fn attribute(engine: &Engine, command: AttributeCommand) -> anyhow::Result<()> {
    match command {
        AttributeCommand::Create(args) => {
            let mut input = NewAttribute::new(args.name, args.data_type);
            if let Some(slug) = args.slug {
                input = input.with_slug(slug);
            }
            if args.required {
                input = input.required();
            }
            if args.unique {
                input = input.unique();
            }
            if let Some(default) = args.default {
                input = input.with_default(default);
            }
            let attribute = engine.create_attribute(input)?;
            status(format!(
                "Created {} attribute '{}'",
                attribute.data_type, attribute.slug
            ));
            print_json(&attribute)
        }
        AttributeCommand::List { entity } => match entity {
            Some(slug) => {
                let entity = engine.find_entity_by_slug(&slug)?;
                print_json(&engine.attributes_for_entity(entity.id)?)
            }
            None => print_json(&engine.list_attributes()?),
        },
        AttributeCommand::Attach { attribute, entity } => {
            let attribute = engine.find_attribute_by_slug(&attribute)?;
            let entity = engine.find_entity_by_slug(&entity)?;
            if engine.attach_attribute(attribute.id, entity.id)? {
                status(format!("Attached '{}' to '{}'", attribute.slug, entity.slug));
            } else {
                notice(format!(
                    "'{}' is already attached to '{}'",
                    attribute.slug, entity.slug
                ));
            }
            Ok(())
        }
        AttributeCommand::Detach { attribute, entity } => {
            let attribute = engine.find_attribute_by_slug(&attribute)?;
            let entity = engine.find_entity_by_slug(&entity)?;
            if engine.detach_attribute(attribute.id, entity.id)? {
                status(format!("Detached '{}' from '{}'", attribute.slug, entity.slug));
            } else {
                notice(format!(
                    "'{}' is not attached to '{}'",
                    attribute.slug, entity.slug
                ));
            }
            Ok(())
        }
        AttributeCommand::Delete { attribute } => {
            let attribute = engine.find_attribute_by_slug(&attribute)?;
            engine.delete_attribute(attribute.id)?;
            status(format!("Deleted attribute '{}'", attribute.slug));
            Ok(())
        }
    }
}

// ============================================================================
// relationship
// ============================================================================

fn relationship(engine: &Engine, command: RelationshipCommand) -> anyhow::Result<()> {
    match command {
        RelationshipCommand::Create {
            relation_type,
            from,
            to,
            name,
            inverse_name,
        } => {
            let from = engine.find_entity_by_slug(&from)?;
            let to = engine.find_entity_by_slug(&to)?;
            let mut input = NewRelationship::new(relation_type, from.id, to.id);
            if let Some(name) = name {
                input = input.with_name(name);
            }
            if let Some(inverse_name) = inverse_name {
                input = input.with_inverse_name(inverse_name);
            }
            let relationship = engine.create_relationship(input)?;
            status(format!(
                "Created {} '{}' {} '{}'",
                relationship.relation_type,
                relationship.name,
                relationship.relation_type.arrow_symbol(),
                relationship.inverse_name
            ));
            print_json(&relationship)
        }
        RelationshipCommand::List { entity } => match entity {
            Some(slug) => {
                let entity = engine.find_entity_by_slug(&slug)?;
                print_json(&engine.relationships_for_entity(entity.id)?)
            }
            None => print_json(&engine.list_relationships()?),
        },
        RelationshipCommand::Delete { id } => {
            let relationship = engine.find_relationship(id)?;
            engine.delete_relationship(id)?;
            status(format!("Deleted relationship '{}'", relationship.name));
            Ok(())
        }
    }
}

// ============================================================================
// record
// ============================================================================

fn parse_data(data: &str) -> anyhow::Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Array(_) => {
            bail!("--data must be a JSON object")
        }
    }
}

fn record(engine: &Engine, command: RecordCommand) -> anyhow::Result<()> {
    match command {
        RecordCommand::Create { entity, data, user } => {
            let data = parse_data(&data)?;
            let record = engine.create_record(&entity, &data, user)?;
            if let Some(id) = record.id() {
                status(format!("Created {} record {}", entity, id));
            }
            print_json(&record)
        }
        RecordCommand::Get { entity, id } => print_json(&engine.get_record(&entity, id)?),
        RecordCommand::List {
            entity,
            page,
            per_page,
        } => print_json(&engine.list_records(&entity, page, per_page)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_data() {
        let data = parse_data(r#"{"title": "X", "tags": [1, 2]}"#).unwrap();
        assert_eq!(data.get("title"), Some(&json!("X")));
        assert!(parse_data("[1]").is_err());
        assert!(parse_data("{oops").is_err());
    }
}
