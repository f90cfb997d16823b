use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use tracing::info;

use crate::sim::{Capabilities, DropTable, ItemDrop, RollRange};

use super::database::{Bestiary, CombatStats, MobDefId, MobTemplate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestiaryErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
}

#[derive(Debug, Clone)]
pub struct BestiaryError {
    pub code: BestiaryErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for BestiaryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for BestiaryError {}

#[derive(Debug, Clone)]
struct PendingMobDef {
    template: MobTemplate,
    location: SourceLocation,
}

/// Loads every `*.xml` under `dir` (sorted by relative path) into one [`Bestiary`].
/// A `defName` may be defined only once across the whole directory.
pub fn load_bestiary(dir: &Path) -> Result<Bestiary, BestiaryError> {
    let xml_files =
        collect_xml_files_sorted(dir).map_err(|error| read_error(error.path, error.source))?;

    let mut merged = BTreeMap::<String, PendingMobDef>::new();
    let mut seen = HashSet::<String>::new();
    for xml_file in xml_files {
        let raw = fs::read_to_string(&xml_file)
            .map_err(|source| read_error(xml_file.clone(), source))?;
        for def in parse_bestiary_document(&xml_file, &raw)? {
            let def_name = def.template.def_name.clone();
            if !seen.insert(def_name.clone()) {
                return Err(BestiaryError {
                    code: BestiaryErrorCode::DuplicateDef,
                    message: format!(
                        "duplicate MobDef '{}'; each defName may be defined only once",
                        def_name
                    ),
                    file_path: xml_file.clone(),
                    location: Some(def.location),
                });
            }
            merged.insert(def_name, def);
        }
    }

    let templates = merged
        .into_values()
        .map(|pending| pending.template)
        .collect::<Vec<_>>();
    info!(dir = %dir.display(), mobs = templates.len(), "bestiary_loaded");
    Ok(Bestiary::from_templates(templates))
}

pub fn parse_bestiary_str(file_path: &Path, raw: &str) -> Result<Bestiary, BestiaryError> {
    let templates = parse_bestiary_document(file_path, raw)?
        .into_iter()
        .map(|pending| pending.template)
        .collect::<Vec<_>>();
    let mut seen = HashSet::<&str>::new();
    for template in &templates {
        if !seen.insert(template.def_name.as_str()) {
            return Err(BestiaryError {
                code: BestiaryErrorCode::DuplicateDef,
                message: format!("duplicate MobDef '{}'", template.def_name),
                file_path: file_path.to_path_buf(),
                location: None,
            });
        }
    }
    Ok(Bestiary::from_templates(templates))
}

struct XmlSource<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl XmlSource<'_, '_> {
    fn location_of(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn error_at(
        &self,
        code: BestiaryErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> BestiaryError {
        BestiaryError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location_of(node)),
        }
    }

    fn required_text(&self, node: Node<'_, '_>, field: &str) -> Result<String, BestiaryError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                BestiaryErrorCode::MissingField,
                format!("field <{}> must not be empty", field),
                node,
            ));
        }
        Ok(value)
    }

    fn parse_value<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        field: &str,
        value: &str,
    ) -> Result<T, BestiaryError> {
        value.parse::<T>().map_err(|_| {
            self.error_at(
                BestiaryErrorCode::InvalidValue,
                format!("{} '{}' is not a valid value", field, value),
                node,
            )
        })
    }

    fn non_negative(
        &self,
        node: Node<'_, '_>,
        field: &str,
        value: f32,
    ) -> Result<f32, BestiaryError> {
        if !value.is_finite() || value < 0.0 {
            return Err(self.error_at(
                BestiaryErrorCode::InvalidValue,
                format!("{} must be finite and >= 0", field),
                node,
            ));
        }
        Ok(value)
    }

    fn number(&self, node: Node<'_, '_>, field: &str) -> Result<f32, BestiaryError> {
        let value = self.required_text(node, field)?;
        let parsed = self.parse_value::<f32>(node, field, &value)?;
        self.non_negative(node, field, parsed)
    }

    fn integer(&self, node: Node<'_, '_>, field: &str) -> Result<u32, BestiaryError> {
        let value = self.required_text(node, field)?;
        self.parse_value::<u32>(node, field, &value)
    }

    fn flag(&self, node: Node<'_, '_>, field: &str) -> Result<bool, BestiaryError> {
        let value = self.required_text(node, field)?;
        match value.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(self.error_at(
                BestiaryErrorCode::InvalidValue,
                format!("{} '{}' must be true or false", field, value),
                node,
            )),
        }
    }

    fn attr_integer(&self, node: Node<'_, '_>, name: &str) -> Result<Option<u32>, BestiaryError> {
        node.attribute(name)
            .map(|value| self.parse_value::<u32>(node, name, value.trim()))
            .transpose()
    }

    fn attr_number(&self, node: Node<'_, '_>, name: &str) -> Result<Option<f32>, BestiaryError> {
        match node.attribute(name) {
            None => Ok(None),
            Some(value) => {
                let parsed = self.parse_value::<f32>(node, name, value.trim())?;
                self.non_negative(node, name, parsed).map(Some)
            }
        }
    }

    fn missing(&self, node: Node<'_, '_>, field: &str, parent: &str) -> BestiaryError {
        self.error_at(
            BestiaryErrorCode::MissingField,
            format!("missing required field <{}> in <{}>", field, parent),
            node,
        )
    }

    fn unknown(&self, node: Node<'_, '_>, parent: &str) -> BestiaryError {
        self.error_at(
            BestiaryErrorCode::UnknownField,
            format!("unknown field <{}> in <{}>", node.tag_name().name(), parent),
            node,
        )
    }

    /// Element children of `node`, rejecting repeated tags.
    fn unique_fields<'n, 'i>(
        &self,
        node: Node<'n, 'i>,
        parent: &str,
    ) -> Result<Vec<Node<'n, 'i>>, BestiaryError> {
        let mut seen = HashSet::<&str>::new();
        let mut fields = Vec::new();
        for field in node.children().filter(|child| child.is_element()) {
            if !seen.insert(field.tag_name().name()) {
                return Err(self.error_at(
                    BestiaryErrorCode::DuplicateField,
                    format!("duplicate field <{}> in <{}>", field.tag_name().name(), parent),
                    field,
                ));
            }
            fields.push(field);
        }
        Ok(fields)
    }
}

fn parse_bestiary_document(
    file_path: &Path,
    raw: &str,
) -> Result<Vec<PendingMobDef>, BestiaryError> {
    let doc = Document::parse(raw).map_err(|error| BestiaryError {
        code: BestiaryErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let source = XmlSource {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Bestiary" {
        return Err(source.error_at(
            BestiaryErrorCode::InvalidRoot,
            "root element must be <Bestiary>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::<PendingMobDef>::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "MobDef" {
            return Err(source.error_at(
                BestiaryErrorCode::UnknownDefType,
                format!(
                    "unsupported def type <{}>; a bestiary holds only <MobDef>",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        defs.push(PendingMobDef {
            template: parse_mob_def(&source, child)?,
            location: source.location_of(child),
        });
    }
    Ok(defs)
}

fn parse_mob_def(source: &XmlSource<'_, '_>, node: Node<'_, '_>) -> Result<MobTemplate, BestiaryError> {
    let mut def_name: Option<String> = None;
    let mut label: Option<String> = None;
    let mut max_health: Option<f32> = None;
    let mut template = MobTemplate {
        id: MobDefId(0),
        def_name: String::new(),
        label: String::new(),
        level: 1,
        max_health: 0.0,
        defence: 0.0,
        speed: 1.0,
        health_regeneration: 1.0,
        wandering_factor: 1.0,
        combat: None,
        capabilities: Capabilities::default(),
        drops: DropTable::default(),
    };

    for field in source.unique_fields(node, "MobDef")? {
        match field.tag_name().name() {
            "defName" => def_name = Some(source.required_text(field, "defName")?),
            "label" => label = Some(source.required_text(field, "label")?),
            "level" => template.level = source.integer(field, "level")?,
            "health" => {
                let health = source.number(field, "health")?;
                if health <= 0.0 {
                    return Err(source.error_at(
                        BestiaryErrorCode::InvalidValue,
                        "health must be > 0".to_string(),
                        field,
                    ));
                }
                max_health = Some(health);
            }
            "defence" => template.defence = source.number(field, "defence")?,
            "speed" => template.speed = source.number(field, "speed")?,
            "healthRegeneration" => {
                template.health_regeneration = source.number(field, "healthRegeneration")?
            }
            "wanderingFactor" => {
                template.wandering_factor = source.number(field, "wanderingFactor")?
            }
            "combat" => template.combat = Some(parse_combat(source, field)?),
            "capabilities" => template.capabilities = parse_capabilities(source, field)?,
            "drops" => template.drops = parse_drops(source, field)?,
            _ => return Err(source.unknown(field, "MobDef")),
        }
    }

    template.def_name = def_name.ok_or_else(|| source.missing(node, "defName", "MobDef"))?;
    template.label = label.ok_or_else(|| source.missing(node, "label", "MobDef"))?;
    template.max_health = max_health.ok_or_else(|| source.missing(node, "health", "MobDef"))?;
    Ok(template)
}

fn parse_combat(source: &XmlSource<'_, '_>, node: Node<'_, '_>) -> Result<CombatStats, BestiaryError> {
    let mut combat = CombatStats::default();
    for field in source.unique_fields(node, "combat")? {
        match field.tag_name().name() {
            "strength" => combat.strength = source.number(field, "strength")?,
            "damage" => combat.damage = source.number(field, "damage")?,
            "attackSpeed" => combat.attack_speed = source.number(field, "attackSpeed")?,
            "attackRange" => combat.attack_range = source.integer(field, "attackRange")?,
            "aggroRange" => combat.aggro_range = source.integer(field, "aggroRange")?,
            _ => return Err(source.unknown(field, "combat")),
        }
    }
    Ok(combat)
}

fn parse_capabilities(
    source: &XmlSource<'_, '_>,
    node: Node<'_, '_>,
) -> Result<Capabilities, BestiaryError> {
    let mut capabilities = Capabilities::default();
    for field in source.unique_fields(node, "capabilities")? {
        match field.tag_name().name() {
            "canWander" => capabilities.can_wander = source.flag(field, "canWander")?,
            "canFlee" => capabilities.can_flee = source.flag(field, "canFlee")?,
            "canChase" => capabilities.can_chase = source.flag(field, "canChase")?,
            "canPatrol" => capabilities.can_patrol = source.flag(field, "canPatrol")?,
            _ => return Err(source.unknown(field, "capabilities")),
        }
    }
    Ok(capabilities)
}

fn parse_drops(source: &XmlSource<'_, '_>, node: Node<'_, '_>) -> Result<DropTable, BestiaryError> {
    let mut drops = DropTable::default();
    let mut seen_gold = false;
    let mut seen_experience = false;
    for field in node.children().filter(|child| child.is_element()) {
        let name = field.tag_name().name();
        let repeated = match name {
            "gold" => std::mem::replace(&mut seen_gold, true),
            "experience" => std::mem::replace(&mut seen_experience, true),
            _ => false,
        };
        if repeated {
            return Err(source.error_at(
                BestiaryErrorCode::DuplicateField,
                format!("duplicate field <{}> in <drops>", name),
                field,
            ));
        }

        match name {
            "gold" => drops.gold = Some(parse_range(source, field, "gold")?),
            "experience" => drops.experience = source.integer(field, "experience")?,
            "item" => {
                let item_id = field
                    .attribute("itemId")
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| source.missing(field, "itemId", "item"))?
                    .to_string();
                let chance = source
                    .attr_number(field, "chance")?
                    .ok_or_else(|| source.missing(field, "chance", "item"))?;
                if chance > 100.0 {
                    return Err(source.error_at(
                        BestiaryErrorCode::InvalidValue,
                        format!("item '{}' chance must be within 0..=100", item_id),
                        field,
                    ));
                }
                let quantity = match (
                    source.attr_integer(field, "min")?,
                    source.attr_integer(field, "max")?,
                ) {
                    (None, None) => None,
                    (Some(min), max) => Some(RollRange {
                        min,
                        max: max.unwrap_or(min),
                    }),
                    (None, Some(max)) => Some(RollRange { min: 1, max }),
                };
                drops.items.push(ItemDrop {
                    item_id,
                    chance,
                    quantity,
                });
            }
            _ => return Err(source.unknown(field, "drops")),
        }
    }
    Ok(drops)
}

fn parse_range(
    source: &XmlSource<'_, '_>,
    node: Node<'_, '_>,
    field: &str,
) -> Result<RollRange, BestiaryError> {
    let min = source
        .attr_integer(node, "min")?
        .ok_or_else(|| source.missing(node, "min", field))?;
    let max = source
        .attr_integer(node, "max")?
        .ok_or_else(|| source.missing(node, "max", field))?;
    if max < min {
        return Err(source.error_at(
            BestiaryErrorCode::InvalidValue,
            format!("{} max {} is below min {}", field, max, min),
            node,
        ));
    }
    Ok(RollRange { min, max })
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(path: PathBuf, source: std::io::Error) -> BestiaryError {
    BestiaryError {
        code: BestiaryErrorCode::ReadFile,
        message: format!("failed to read bestiary file: {source}"),
        file_path: path,
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    const GOBLIN: &str = r#"<Bestiary>
        <MobDef>
            <defName>goblin</defName>
            <label>Goblin</label>
            <level>5</level>
            <health>200</health>
            <defence>10</defence>
            <speed>1</speed>
            <combat>
                <strength>1</strength>
                <damage>10</damage>
                <aggroRange>3</aggroRange>
            </combat>
            <capabilities><canPatrol>true</canPatrol></capabilities>
            <drops>
                <gold min="2" max="6"/>
                <experience>15</experience>
                <item itemId="ear" chance="40" min="1" max="2"/>
                <item itemId="dagger" chance="5"/>
            </drops>
        </MobDef>
    </Bestiary>"#;

    #[test]
    fn full_mob_def_parses() {
        let temp = TempDir::new().expect("temp");
        write_file(&temp.path().join("goblin.xml"), GOBLIN);
        let bestiary = load_bestiary(temp.path()).expect("load");
        let goblin = bestiary.template_by_name("goblin").expect("goblin");
        assert_eq!(goblin.label, "Goblin");
        assert_eq!(goblin.level, 5);
        assert_eq!(goblin.max_health, 200.0);
        assert_eq!(goblin.health_regeneration, 1.0);
        let combat = goblin.combat.expect("combat");
        assert_eq!(combat.damage, 10.0);
        assert_eq!(combat.aggro_range, 3);
        assert_eq!(combat.attack_range, 1);
        assert!(goblin.capabilities.can_patrol);
        assert!(goblin.capabilities.can_wander);
        assert_eq!(goblin.drops.gold, Some(RollRange { min: 2, max: 6 }));
        assert_eq!(goblin.drops.experience, 15);
        assert_eq!(goblin.drops.items.len(), 2);
        assert_eq!(goblin.drops.items[1].quantity, None);
    }

    #[test]
    fn templates_are_ordered_by_def_name_across_files() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("b.xml"),
            r#"<Bestiary><MobDef><defName>zombie</defName><label>Z</label><health>5</health></MobDef></Bestiary>"#,
        );
        write_file(
            &temp.path().join("nested").join("a.xml"),
            r#"<Bestiary><MobDef><defName>ant</defName><label>A</label><health>1</health></MobDef></Bestiary>"#,
        );
        let bestiary = load_bestiary(temp.path()).expect("load");
        let ant = bestiary.id_by_name("ant").expect("ant");
        let zombie = bestiary.id_by_name("zombie").expect("zombie");
        assert!(ant.0 < zombie.0);
    }

    #[test]
    fn missing_health_reports_file_and_location() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("bad.xml"),
            r#"<Bestiary><MobDef><defName>a</defName><label>A</label></MobDef></Bestiary>"#,
        );
        let err = load_bestiary(temp.path()).expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::MissingField);
        assert!(err.file_path.ends_with("bad.xml"));
        assert!(err.location.is_some());
    }

    #[test]
    fn unknown_field_errors() {
        let err = parse_bestiary_str(
            Path::new("inline.xml"),
            r#"<Bestiary><MobDef><defName>a</defName><label>A</label><health>1</health><mood>Happy</mood></MobDef></Bestiary>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::UnknownField);
    }

    #[test]
    fn negative_and_non_numeric_values_error() {
        for body in [
            "<defence>-1</defence>",
            "<speed>fast</speed>",
            "<level>2.5</level>",
            "<combat><attackSpeed>NaN</attackSpeed></combat>",
            "<capabilities><canFlee>yes</canFlee></capabilities>",
            r#"<drops><gold min="5" max="1"/></drops>"#,
            r#"<drops><item itemId="x" chance="120"/></drops>"#,
        ] {
            let raw = format!(
                "<Bestiary><MobDef><defName>a</defName><label>A</label><health>1</health>{body}</MobDef></Bestiary>"
            );
            let err = parse_bestiary_str(Path::new("inline.xml"), &raw).expect_err(body);
            assert_eq!(err.code, BestiaryErrorCode::InvalidValue, "{body}");
        }
    }

    #[test]
    fn duplicate_field_errors() {
        let err = parse_bestiary_str(
            Path::new("inline.xml"),
            r#"<Bestiary><MobDef><defName>a</defName><defName>b</defName><label>A</label><health>1</health></MobDef></Bestiary>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::DuplicateField);
    }

    #[test]
    fn malformed_xml_reports_location() {
        let err = parse_bestiary_str(
            Path::new("inline.xml"),
            r#"<Bestiary><MobDef><defName>a</defName></Bestiary>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn wrong_root_and_def_type_error() {
        let err = parse_bestiary_str(Path::new("inline.xml"), "<Defs/>").expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::InvalidRoot);
        let err = parse_bestiary_str(Path::new("inline.xml"), "<Bestiary><ItemDef/></Bestiary>")
            .expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::UnknownDefType);
    }

    #[test]
    fn duplicate_def_across_files_errors() {
        let temp = TempDir::new().expect("temp");
        let def = r#"<Bestiary><MobDef><defName>rat</defName><label>Rat</label><health>3</health></MobDef></Bestiary>"#;
        write_file(&temp.path().join("a.xml"), def);
        write_file(&temp.path().join("b.xml"), def);
        let err = load_bestiary(temp.path()).expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::DuplicateDef);
        assert!(err.file_path.ends_with("b.xml"));
    }

    #[test]
    fn missing_directory_is_read_error() {
        let temp = TempDir::new().expect("temp");
        let err = load_bestiary(&temp.path().join("absent")).expect_err("err");
        assert_eq!(err.code, BestiaryErrorCode::ReadFile);
    }
}
