//! The substance-journal schema.
//!
//! Ten models: accounts own subjects, subjects log ingestions and keep
//! stashes, and substances carry their routes of administration with
//! dosages and phases. Phases and effects are linked many-to-many through
//! the `_EffectToPhase` join table (`A` = effect id, `B` = phase id).

use neuronek_db_core::{Result, SchemaRegistry, SchemaRegistryBuilder};
use neuronek_db_types::prelude::*;

// =============================================================================
// Account
// =============================================================================

const ACCOUNT_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("username").unique(),
    FieldDef::string("password"),
];

const ACCOUNT_RELATIONS: &[RelationDef] = &[RelationDef::to_many("subjects", "Subject")
    .fields(&["id"])
    .references(&["account_id"])];

pub static ACCOUNT: ModelDef = ModelDef::new("Account")
    .fields(ACCOUNT_FIELDS)
    .relations(ACCOUNT_RELATIONS);

// =============================================================================
// Subject
// =============================================================================

const SUBJECT_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("firstName").optional(),
    FieldDef::string("lastName").optional(),
    FieldDef::datetime("dateOfBirth").optional(),
    FieldDef::float("weight").optional(),
    FieldDef::float("height").optional(),
    FieldDef::string("account_id").optional().unique(),
];

const SUBJECT_RELATIONS: &[RelationDef] = &[
    RelationDef::to_one("account", "Account")
        .fields(&["account_id"])
        .references(&["id"])
        .owning()
        .on_delete(ReferentialAction::SetNull),
    RelationDef::to_many("ingestions", "Ingestion")
        .fields(&["id"])
        .references(&["subject_id"]),
    RelationDef::to_many("stashes", "Stash")
        .fields(&["id"])
        .references(&["owner_id"]),
];

pub static SUBJECT: ModelDef = ModelDef::new("Subject")
    .fields(SUBJECT_FIELDS)
    .relations(SUBJECT_RELATIONS);

// =============================================================================
// Substance
// =============================================================================

const SUBSTANCE_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("name").unique(),
    FieldDef::string("common_names").optional(),
    FieldDef::string("brand_names").optional(),
    FieldDef::string("substitutive_name").optional(),
    FieldDef::string("systematic_name").optional(),
    FieldDef::string("unii").optional(),
    FieldDef::string("cas_number").optional(),
    FieldDef::string("inchi_key").optional(),
    FieldDef::string("iupac").optional(),
    FieldDef::string("smiles").optional(),
    FieldDef::string("psychoactive_class").optional(),
    FieldDef::string("chemical_class").optional(),
    FieldDef::string("description").optional(),
];

const SUBSTANCE_RELATIONS: &[RelationDef] = &[
    RelationDef::to_many("routes_of_administration", "RouteOfAdministration")
        .fields(&["name"])
        .references(&["substanceName"]),
    RelationDef::to_many("ingestions", "Ingestion")
        .fields(&["name"])
        .references(&["substanceName"]),
    RelationDef::to_many("stashes", "Stash")
        .fields(&["id"])
        .references(&["substance_id"]),
    RelationDef::to_many("interactions", "SubstanceInteraction")
        .fields(&["id"])
        .references(&["substanceId"]),
];

pub static SUBSTANCE: ModelDef = ModelDef::new("Substance")
    .fields(SUBSTANCE_FIELDS)
    .relations(SUBSTANCE_RELATIONS);

// =============================================================================
// RouteOfAdministration
// =============================================================================

const ROUTE_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("substanceName").optional(),
    FieldDef::string("name"),
    FieldDef::float("bioavailability").optional(),
];

const ROUTE_RELATIONS: &[RelationDef] = &[
    RelationDef::to_one("substance", "Substance")
        .fields(&["substanceName"])
        .references(&["name"])
        .owning()
        .on_delete(ReferentialAction::SetNull),
    RelationDef::to_many("dosage", "Dosage")
        .fields(&["id"])
        .references(&["routeOfAdministrationId"]),
    RelationDef::to_many("phases", "Phase")
        .fields(&["id"])
        .references(&["routeOfAdministrationId"]),
];

const ROUTE_UNIQUES: &[UniqueDef] = &[UniqueDef::new(
    "name_substanceName",
    &["name", "substanceName"],
)];

pub static ROUTE_OF_ADMINISTRATION: ModelDef = ModelDef::new("RouteOfAdministration")
    .fields(ROUTE_FIELDS)
    .relations(ROUTE_RELATIONS)
    .uniques(ROUTE_UNIQUES);

// =============================================================================
// Phase
// =============================================================================

const PHASE_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::int("from").optional(),
    FieldDef::int("to").optional(),
    FieldDef::string("routeOfAdministrationId").optional(),
];

const PHASE_RELATIONS: &[RelationDef] = &[
    RelationDef::to_one("route_of_administration", "RouteOfAdministration")
        .fields(&["routeOfAdministrationId"])
        .references(&["id"])
        .owning()
        .on_delete(ReferentialAction::SetNull),
    RelationDef::many_to_many(
        "effects",
        "Effect",
        JoinTableDef::new("_EffectToPhase", "B", "A"),
    ),
];

pub static PHASE: ModelDef = ModelDef::new("Phase")
    .fields(PHASE_FIELDS)
    .relations(PHASE_RELATIONS);

// =============================================================================
// Dosage
// =============================================================================

const DOSAGE_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("intensivity"),
    FieldDef::float("amount_min"),
    FieldDef::float("amount_max"),
    FieldDef::string("unit"),
    FieldDef::boolean("perKilogram").default_value(DefaultValue::Bool(false)),
    FieldDef::string("routeOfAdministrationId").optional(),
];

const DOSAGE_RELATIONS: &[RelationDef] = &[RelationDef::to_one(
    "route_of_administration",
    "RouteOfAdministration",
)
.fields(&["routeOfAdministrationId"])
.references(&["id"])
.owning()
.on_delete(ReferentialAction::SetNull)];

const DOSAGE_UNIQUES: &[UniqueDef] = &[UniqueDef::new(
    "intensivity_routeOfAdministrationId",
    &["intensivity", "routeOfAdministrationId"],
)];

pub static DOSAGE: ModelDef = ModelDef::new("Dosage")
    .fields(DOSAGE_FIELDS)
    .relations(DOSAGE_RELATIONS)
    .uniques(DOSAGE_UNIQUES);

// =============================================================================
// Effect
// =============================================================================

const EFFECT_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("name").unique(),
    FieldDef::string("slug").unique(),
    FieldDef::string("category").optional(),
    FieldDef::string("type").optional(),
    FieldDef::string("tags").optional(),
    FieldDef::string("summary").optional(),
    FieldDef::string("description").optional(),
    FieldDef::string("parameters").optional(),
    FieldDef::string("see_also").optional(),
    FieldDef::string("effectindex").optional(),
    FieldDef::string("psychonautwiki").optional(),
];

const EFFECT_RELATIONS: &[RelationDef] = &[RelationDef::many_to_many(
    "phases",
    "Phase",
    JoinTableDef::new("_EffectToPhase", "A", "B"),
)];

pub static EFFECT: ModelDef = ModelDef::new("Effect")
    .fields(EFFECT_FIELDS)
    .relations(EFFECT_RELATIONS);

// =============================================================================
// Ingestion
// =============================================================================

const INGESTION_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("substanceName").optional(),
    FieldDef::string("routeOfAdministration").optional(),
    FieldDef::string("dosage_unit").optional(),
    FieldDef::float("dosage_amount").optional(),
    FieldDef::boolean("isEstimatedDosage")
        .optional()
        .default_value(DefaultValue::Bool(false)),
    FieldDef::datetime("date").optional().default_now(),
    FieldDef::string("subject_id").optional(),
    FieldDef::string("stashId").optional(),
];

const INGESTION_RELATIONS: &[RelationDef] = &[
    RelationDef::to_one("subject", "Subject")
        .fields(&["subject_id"])
        .references(&["id"])
        .owning()
        .on_delete(ReferentialAction::SetNull),
    RelationDef::to_one("substance", "Substance")
        .fields(&["substanceName"])
        .references(&["name"])
        .owning()
        .on_delete(ReferentialAction::SetNull),
    RelationDef::to_one("stash", "Stash")
        .fields(&["stashId"])
        .references(&["id"])
        .owning()
        .on_delete(ReferentialAction::SetNull),
];

pub static INGESTION: ModelDef = ModelDef::new("Ingestion")
    .fields(INGESTION_FIELDS)
    .relations(INGESTION_RELATIONS);

// =============================================================================
// Stash
// =============================================================================

const STASH_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("owner_id").optional(),
    FieldDef::string("substance_id"),
    FieldDef::datetime("addedDate").optional().default_now(),
    FieldDef::datetime("expiration").optional(),
    FieldDef::float("amount").optional(),
    FieldDef::float("price").optional(),
    FieldDef::string("vendor").optional(),
    FieldDef::string("description").optional(),
    FieldDef::float("purity").optional(),
];

const STASH_RELATIONS: &[RelationDef] = &[
    RelationDef::to_one("owner", "Subject")
        .fields(&["owner_id"])
        .references(&["id"])
        .owning()
        .on_delete(ReferentialAction::SetNull),
    RelationDef::to_one("substance", "Substance")
        .fields(&["substance_id"])
        .references(&["id"])
        .owning()
        .required(),
    RelationDef::to_many("ingestions", "Ingestion")
        .fields(&["id"])
        .references(&["stashId"]),
];

pub static STASH: ModelDef = ModelDef::new("Stash")
    .fields(STASH_FIELDS)
    .relations(STASH_RELATIONS);

// =============================================================================
// SubstanceInteraction
// =============================================================================

const INTERACTION_FIELDS: &[FieldDef] = &[
    FieldDef::string("id").id().default_uuid(),
    FieldDef::string("substanceId").optional(),
];

const INTERACTION_RELATIONS: &[RelationDef] = &[RelationDef::to_one("substance", "Substance")
    .fields(&["substanceId"])
    .references(&["id"])
    .owning()
    .on_delete(ReferentialAction::SetNull)];

pub static SUBSTANCE_INTERACTION: ModelDef = ModelDef::new("SubstanceInteraction")
    .fields(INTERACTION_FIELDS)
    .relations(INTERACTION_RELATIONS);

// =============================================================================
// Registry
// =============================================================================

/// Every journal model, in declaration order
pub static MODELS: [&ModelDef; 10] = [
    &ACCOUNT,
    &SUBJECT,
    &SUBSTANCE,
    &ROUTE_OF_ADMINISTRATION,
    &PHASE,
    &DOSAGE,
    &EFFECT,
    &INGESTION,
    &STASH,
    &SUBSTANCE_INTERACTION,
];

/// A registry builder preloaded with the journal models, for adding hooks
pub fn builder() -> SchemaRegistryBuilder {
    SchemaRegistry::builder().models(MODELS)
}

pub fn registry() -> Result<SchemaRegistry> {
    builder().build()
}
