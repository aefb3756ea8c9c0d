//! Built-in reference data for the Spanish-speaking agronomy bot
//!
//! The reference rule set is organised in four priority groups:
//!
//! 1. enumerated options (`Opciones: a, b`) → reply with the first option
//! 2. duplicate entity (`ya existe`) → retry once with a mutated variable
//! 3. terminal success / error phrases, matched anywhere in the turn
//! 4. field prompts, one per variable, matched against a whole bubble

use std::collections::BTreeMap;

use crate::error::Result;
use crate::rules::{Applicability, MatchScope, ReplyTemplate, Rule, RuleAction, RuleTable};
use crate::template::Scenario;

pub const PRIORITY_OPTIONS: i32 = 1;
pub const PRIORITY_EXISTS: i32 = 2;
pub const PRIORITY_TERMINAL: i32 = 3;
pub const PRIORITY_FIELD: i32 = 4;

/// Variable whose value is perturbed on a duplicate-entity retry
pub const RETRY_VARIABLE: &str = "brand";

/// Optional lead-ins the bot puts before a field name
const FIELD_LEAD_IN: &str = r"(?:(?:por\s+favor,?\s+)?(?:ind[ií]ca(?:me)?|dime|introduce|escribe|cu[aá]l\s+es)\s+)?(?:el\s+|la\s+)?";

/// Anchored field-prompt pattern: the whole bubble must be the prompt
fn field_prompt(alternatives: &str) -> String {
    format!(r"^\s*¿?\s*{FIELD_LEAD_IN}(?:{alternatives})\s*[.:?!]*\s*$")
}

fn field(alternatives: &str, variable: &str, note: &str) -> Result<Rule> {
    Ok(Rule::pattern(
        &field_prompt(alternatives),
        RuleAction::Reply(ReplyTemplate::Literal(format!("{{{variable}}}"))),
    )?
    .with_scope(MatchScope::Message)
    .with_priority(PRIORITY_FIELD)
    .with_note(note))
}

fn terminal(pattern: &str, action: RuleAction, note: &str) -> Result<Rule> {
    Ok(Rule::pattern(pattern, action)?
        .with_priority(PRIORITY_TERMINAL)
        .with_note(note))
}

/// The reference rule table
pub fn reference_rules() -> Result<RuleTable> {
    let rules = vec![
        Rule::pattern(r"opciones:", RuleAction::Reply(ReplyTemplate::FirstOption))?
            .with_priority(PRIORITY_OPTIONS)
            .with_note("Lista de opciones detectada"),
        Rule::pattern(r"ya\s+exist", RuleAction::RetryExists)?
            .with_priority(PRIORITY_EXISTS)
            .with_note("Elemento ya existe - reintentar"),
        // Success phrases come before the generic error rule of the same priority
        terminal(
            r"(?:creado|registrado|guardado|planificado|asignado)\s+correctamente",
            RuleAction::EndOk,
            "Creación exitosa",
        )?,
        terminal(
            r"operación completada|proceso finalizado|todo listo|completado exitosamente",
            RuleAction::EndOk,
            "Operación exitosa",
        )?,
        terminal(r"reporte enviado|trabajo reportado", RuleAction::EndOk, "Reporte exitoso")?,
        terminal(
            r"precio\s+(?:asignado|actualizado|registrado|fijado)|asigno un precio",
            RuleAction::EndOk,
            "Precio asignado/actualizado",
        )?,
        terminal(r"[ée]xit[oa]s?", RuleAction::EndOk, "Éxito detectado")?,
        terminal(r"gracias por usar|hasta luego|adi[oó]s", RuleAction::EndOk, "Despedida")?,
        terminal(r"cultivo:", RuleAction::EndOk, "Lista de cultivos recibida")?
            .with_applicability(Applicability::only(["list_crops", "get_crop_distribution"])),
        terminal(
            r"error|fallo|problema|no se pudo|no se encontr[oó]|no existe|inv[aá]lid[oa]|no\s+v[aá]lido",
            RuleAction::EndErr,
            "Error detectado",
        )?,
        // Cultivos
        field(r"nombre\s+de\s+la\s+variedad|variedad(?:\s+del\s+cultivo)?", "variety_name", "Pide variedad")?,
        field(r"nombre\s+del\s+cultivo|qu[ée]\s+cultivo|cultivo", "crop_name", "Pide cultivo")?,
        field(r"destino(?:\s+del\s+cultivo)?", "destination", "Pide destino")?,
        field(r"marca(?:\s+del\s+cultivo)?", "brand", "Pide marca")?,
        // Clientes
        field(
            r"(?:nombre\s+de\s+)?usuario\s+del\s+cliente",
            "nombre_usuario_cliente",
            "Pide usuario cliente",
        )?,
        field(r"(?:nombre\s+del\s+)?cliente|para\s+qu[ée]\s+cliente", "client", "Pide cliente")?,
        // Fertilizantes
        field(r"tipo\s+de\s+fertilizante", "type_fertilizer", "Pide tipo fertilizante")?,
        field(r"(?:nombre\s+del\s+)?fertilizante", "fertilizer_name", "Pide fertilizante")?,
        field(r"composici[oó]n", "composition", "Pide composición")?,
        field(r"forma(?:\s+del\s+fertilizante)?", "form_type", "Pide forma")?,
        field(r"nivel\s+de\s+nitr[oó]geno", "nitrogen_level", "Pide nitrógeno")?,
        // Fitosanitarios
        field(
            r"(?:nombre\s+del\s+)?fabricante(?:\s+del\s+producto(?:\s+que\s+deseas\s+registrar)?)?",
            "manufacturer_name",
            "Pide fabricante",
        )?,
        field(
            r"(?:nombre\s+del\s+)?producto\s+qu[ií]mico",
            "chemical_product_name",
            "Pide producto químico",
        )?,
        field(r"materia\s+activa|principio\s+activo", "active_matter_name", "Pide materia activa")?,
        field(r"plaga(?:\s+objetivo)?", "target_pest", "Pide plaga")?,
        field(r"modo\s+de\s+acci[oó]n", "mode_of_action", "Pide modo acción")?,
        // Granjas y campos
        field(
            r"(?:nombre\s+de\s+la\s+)?granja|explotaci[oó]n|qu[ée]\s+granja",
            "farm_name",
            "Pide granja",
        )?,
        field(r"(?:nombre\s+del\s+)?campo|parcela|qu[ée]\s+campo", "field_name", "Pide campo")?,
        field(r"nombre\s+de\s+la\s+campa[ñn]a", "campaign_name", "Pide campaña")?,
        // Trabajos
        field(r"tipo\s+de\s+trabajo", "type_work", "Pide tipo trabajo")?,
        field(r"id\s+del\s+trabajo", "work_id", "Pide ID trabajo")?,
        field(r"horas\s+trabajadas", "worked_hours", "Pide horas")?,
        field(r"dosis\s+aplicada", "applied_dose", "Pide dosis aplicada")?,
        field(
            r"dosis(?:\s+(?:general|planificada|recomendada))?(?:\s*\(\s*kg\s*/?\s*ha?\s*\))?",
            "general_dose",
            "Pide dosis",
        )?,
        field(r"cantidad\s+cosechada", "amount_harvested", "Pide cantidad cosechada")?,
        field(r"profundidad", "depth", "Pide profundidad")?,
        field(r"combustible\s+usado", "fuel_used", "Pide combustible")?,
        // Precios
        field(r"fecha(?:\s+del?\s+precio|\s+de\s+vigencia)?", "price_date", "Pide fecha precio")?,
        field(r"precio|importe|valor|coste|costo", "price", "Pide precio")?,
        field(
            r"(?:nombre\s+del\s+)?producto|nombre\s+del\s+art[ií]culo",
            "product_name",
            "Pide nombre producto",
        )?,
        // Búsquedas
        field(r"b[uú]squeda|qu[ée]\s+producto\s+buscar", "search_query", "Pide búsqueda")?,
    ];

    Ok(RuleTable::new(rules))
}

/// Reference default bindings
pub fn reference_defaults() -> BTreeMap<String, String> {
    [
        ("active_matter_name", "Glifosato"),
        ("amount_harvested", "5000"),
        ("applied_dose", "2.5"),
        ("brand", "GrainMaster"),
        ("campaign_name", "campaña-test"),
        ("chemical_product_name", "Herbicida Total"),
        ("client", "AgroTalavera"),
        ("composition", "15-15-15"),
        ("crop_name", "trigo"),
        ("depth", "30"),
        ("destination", "pienso"),
        ("farm_name", "Explotación Norte"),
        ("fertilizer_name", "NPK Completo"),
        ("field_name", "Campo 1"),
        ("form_type", "granulado"),
        ("fuel_used", "45"),
        ("general_dose", "200"),
        ("manufacturer_name", "AgroChemicals SA"),
        ("mode_of_action", "sistémico"),
        ("nitrogen_level", "46"),
        ("nombre_usuario_cliente", "Juan Pérez"),
        ("price", "250"),
        ("price_date", "hoy"),
        ("product_name", "Urea"),
        ("search_query", "fertilizante"),
        ("target_pest", "malas hierbas"),
        ("type_fertilizer", "nitrogenado"),
        ("type_work", "siembra"),
        ("variety_name", "Chamorro"),
        ("work_id", "WORK-12345"),
        ("worked_hours", "8"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn entry(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Randomization groups: one entry of each group is bound per run
pub fn reference_pools() -> Vec<Vec<BTreeMap<String, String>>> {
    let crops = [
        ("trigo", "Chamorro", "pienso", "GrainMaster"),
        ("maíz", "p 8660", "consumo", "SeedTech"),
        ("cebada", "Golden", "pienso", "HarvestPlus"),
        ("avena", "Premium", "consumo", "FarmSelect"),
        ("girasol", "Solaris", "aceite", "SunFields"),
        ("tomate", "Raf", "consumo", "VeggieTop"),
    ]
    .iter()
    .map(|(crop, variety, destination, brand)| {
        entry(&[
            ("crop_name", crop),
            ("variety_name", variety),
            ("destination", destination),
            ("brand", brand),
        ])
    })
    .collect();

    let clients = [
        "AgroTalavera",
        "Finca Los Olivos",
        "Agrícola San José",
        "El Cortijo",
        "La Dehesa",
    ]
    .iter()
    .map(|client| entry(&[("client", client)]))
    .collect();

    vec![crops, clients]
}

fn scenario(name: &str, tags: &[&str], templates: &[&str]) -> Scenario {
    Scenario {
        name: name.to_string(),
        description: String::new(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        templates: templates.iter().map(|t| t.to_string()).collect(),
    }
}

/// A small scenario set used when no scenario directory is configured
pub fn reference_scenarios() -> Vec<Scenario> {
    vec![
        scenario(
            "create_crop",
            &["create"],
            &[
                "crear cultivo",
                "quiero registrar un cultivo",
                "registra cultivo {crop_name}, variedad {variety_name}, destino {destination}, marca {brand} y cliente {client}",
            ],
        ),
        scenario(
            "create_fertilizer",
            &["create"],
            &["crear fertilizante", "quiero añadir un nuevo fertilizante"],
        ),
        scenario(
            "list_crops",
            &["query"],
            &["listar cultivos", "dame la lista de cultivos"],
        ),
        scenario(
            "get_crop_distribution",
            &["query"],
            &["qué distribución de cultivos tengo este año?"],
        ),
        scenario(
            "assign_product_price",
            &["create"],
            &[
                "asignar precio a producto",
                "Hola Luca, asigna un precio de {price}/tonelada al {product_name}",
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ResponseClassifier;
    use crate::template::VariableBindings;
    use crate::types::Action;
    use test_case::test_case;

    fn classify(parts: &[&str], scenario: Option<&str>) -> Option<Action> {
        let classifier = ResponseClassifier::new(reference_rules().unwrap());
        let bindings = VariableBindings::new(reference_defaults());
        let fragments: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        classifier.classify(&fragments, scenario, &bindings)
    }

    fn reply(text: &str) -> Option<Action> {
        Some(Action::Reply(text.to_string()))
    }

    #[test_case("Nombre del cultivo." ; "plain")]
    #[test_case("nombre del cultivo:" ; "colon")]
    #[test_case("¿Cuál es el nombre del cultivo?" ; "question")]
    #[test_case("¿Qué cultivo?" ; "short question")]
    fn test_crop_prompt_variants(text: &str) {
        assert_eq!(classify(&[text], Some("create_crop")), reply("trigo"));
    }

    #[test_case("Nombre de la variedad", "Chamorro")]
    #[test_case("Por favor, indícame el nombre de la variedad", "Chamorro")]
    #[test_case("Fabricante.", "AgroChemicals SA")]
    #[test_case("Nombre del fabricante del producto que deseas registrar.", "AgroChemicals SA")]
    #[test_case("Destino del cultivo", "pienso")]
    #[test_case("Marca.", "GrainMaster")]
    #[test_case("Dosis (Kg/Ha)", "200")]
    #[test_case("Nombre del producto químico", "Herbicida Total")]
    #[test_case("Nombre del producto", "Urea")]
    #[test_case("Fecha del precio.", "hoy")]
    fn test_field_prompts(text: &str, expected: &str) {
        assert_eq!(classify(&[text], None), reply(expected));
    }

    #[test]
    fn test_field_prompt_is_anchored() {
        assert_eq!(
            classify(&["He guardado la marca del cultivo que indicaste antes y sigo"], None),
            None
        );
    }

    #[test]
    fn test_options_take_precedence() {
        let action = classify(
            &["Ya existe un cultivo con ese nombre.", "Opciones: trigo, cebada"],
            None,
        );
        assert_eq!(action, reply("trigo"));
    }

    #[test]
    fn test_exists_beats_terminal_error() {
        assert_eq!(
            classify(&["Error: el cultivo ya existe"], None),
            Some(Action::RetryExists)
        );
    }

    #[test]
    fn test_terminal_phrases_inside_longer_text() {
        assert_eq!(
            classify(&["Perfecto.", "El cultivo ha sido creado correctamente en tu cuenta."], None),
            Some(Action::EndOk)
        );
        assert_eq!(
            classify(&["Lo siento, no se pudo completar la operación"], None),
            Some(Action::EndErr)
        );
    }

    #[test]
    fn test_list_rule_scoped_to_queries() {
        let listing = ["Cultivo: trigo (Chamorro)"];
        assert_eq!(classify(&listing, Some("list_crops")), Some(Action::EndOk));
        assert_eq!(classify(&listing, Some("create_crop")), None);
    }

    #[test]
    fn test_reference_scenarios_use_known_variables() {
        let defaults = reference_defaults();
        for scenario in reference_scenarios() {
            for template in &scenario.templates {
                for name in crate::template::placeholders(template) {
                    assert!(defaults.contains_key(&name), "{} uses unknown {}", scenario.name, name);
                }
            }
        }
    }

    #[test]
    fn test_pools_bind_known_variables() {
        let defaults = reference_defaults();
        for group in reference_pools() {
            assert!(!group.is_empty());
            for entry in group {
                for name in entry.keys() {
                    assert!(defaults.contains_key(name));
                }
            }
        }
        assert!(defaults.contains_key(RETRY_VARIABLE));
    }
}
