use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;
use uuid::Uuid;

use super::types::{
    ParseWarning, ProjectInSolution, ProjectType, Solution, SolutionFolder, SOLUTION_FOLDER_TYPE,
};
use crate::error::MalformedSolutionError;
use crate::workspace::{normalize, to_host_path};

const HEADER_PREFIX: &str = "Microsoft Visual Studio Solution File, Format Version";
const NESTED_PROJECTS: &str = "NestedProjects";
const SOLUTION_ITEMS: &str = "SolutionItems";

fn project_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"^Project\(\s*"(?P<type>[^"]*)"\s*\)\s*=\s*"(?P<name>[^"]*)"\s*,\s*"(?P<path>[^"]*)"\s*,\s*"(?P<guid>[^"]*)"\s*$"#,
        )
        .expect("project declaration regex")
    })
}

fn nesting_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<child>\{[^}]*\})\s*=\s*(?P<parent>\{[^}]*\})$")
            .expect("nesting pair regex")
    })
}

fn section_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:Global|Project)Section\(\s*(?P<name>[^)]*?)\s*\)").expect("section regex")
    })
}

/// Reads a solution file from disk, detecting UTF-8/UTF-16 byte order marks,
/// and parses it.
pub async fn parse_file(path: &Path) -> Result<Solution, MalformedSolutionError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| MalformedSolutionError::Unreadable(format!("{}: {e}", path.display())))?;
    let text = decode(&bytes)?;
    parse(&text, path)
}

/// Decodes solution file bytes. Files written by Visual Studio are usually
/// UTF-8 with a BOM; older tooling writes UTF-16.
pub fn decode(bytes: &[u8]) -> Result<String, MalformedSolutionError> {
    let utf16 = |bytes: &[u8], from: fn([u8; 2]) -> u16| {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| from([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units)
            .map_err(|e| MalformedSolutionError::Unreadable(format!("invalid UTF-16: {e}")))
    };

    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8(rest.to_vec())
            .map_err(|e| MalformedSolutionError::Unreadable(format!("invalid UTF-8: {e}"))),
        [0xFF, 0xFE, rest @ ..] => utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8(bytes.to_vec())
            .map_err(|e| MalformedSolutionError::Unreadable(format!("invalid UTF-8: {e}"))),
    }
}

struct NestingPair {
    line: usize,
    child: Uuid,
    parent: Uuid,
}

#[derive(Default)]
struct Declarations {
    format_version: Option<String>,
    visual_studio_version: Option<String>,
    minimum_visual_studio_version: Option<String>,
    projects: Vec<ProjectInSolution>,
    folders: Vec<SolutionFolder>,
    nesting: Vec<NestingPair>,
    warnings: Vec<ParseWarning>,
}

/// Parses solution file text. `solution_path` is only used to resolve the
/// projects' full paths; nothing is read from disk.
///
/// Declarations are collected in a first pass over the lines, then the
/// `NestedProjects` pairs are applied in a second pass once every guid is
/// known.
pub fn parse(text: &str, solution_path: &Path) -> Result<Solution, MalformedSolutionError> {
    let mut declarations = scan(text, solution_path)?;
    let format_version = declarations
        .format_version
        .take()
        .ok_or(MalformedSolutionError::MissingHeader)?;

    apply_nesting(&mut declarations);

    for warning in &declarations.warnings {
        warn!("{}: {}", solution_path.display(), warning);
    }

    Ok(Solution {
        full_path: solution_path.to_path_buf(),
        format_version,
        visual_studio_version: declarations.visual_studio_version,
        minimum_visual_studio_version: declarations.minimum_visual_studio_version,
        projects: declarations.projects,
        folders: declarations.folders,
        warnings: declarations.warnings,
    })
}

fn scan(text: &str, solution_path: &Path) -> Result<Declarations, MalformedSolutionError> {
    let solution_dir = solution_path.parent().unwrap_or_else(|| Path::new(""));
    let mut out = Declarations::default();
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut position = 0;

    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));
    while let Some((line_no, line)) = lines.next() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(version) = line.strip_prefix(HEADER_PREFIX) {
            out.format_version = Some(version.trim().to_string());
            continue;
        }

        if out.format_version.is_none() {
            // Anything structural before the header means it is not a
            // solution file at all.
            if line.starts_with("Project(") || line == "Global" {
                return Err(MalformedSolutionError::MissingHeader);
            }
            continue;
        }

        if let Some(value) = header_value(line, "VisualStudioVersion") {
            out.visual_studio_version = Some(value);
        } else if let Some(value) = header_value(line, "MinimumVisualStudioVersion") {
            out.minimum_visual_studio_version = Some(value);
        } else if line.starts_with("Project(") {
            let items = read_project_body(&mut lines, line_no)?;
            let declared = parse_project_line(line, line_no)?;

            if !seen.insert(declared.id) {
                out.warnings.push(ParseWarning::DuplicateGuid {
                    line: line_no,
                    id: declared.id,
                });
                continue;
            }

            if declared.type_id == SOLUTION_FOLDER_TYPE {
                out.folders.push(SolutionFolder {
                    id: declared.id,
                    name: declared.name,
                    parent_folder_id: None,
                    position,
                    items,
                });
            } else {
                out.projects.push(ProjectInSolution {
                    id: declared.id,
                    full_path: normalize(&solution_dir.join(to_host_path(&declared.relative_path))),
                    name: declared.name,
                    relative_path: declared.relative_path,
                    project_type_id: declared.type_id,
                    project_type: ProjectType::from_type_id(&declared.type_id),
                    parent_folder_id: None,
                    position,
                });
            }
            position += 1;
        } else if line == "Global" {
            read_global(&mut lines, line_no, &mut out.nesting)?;
        } else if line.starts_with("EndProject") || line.starts_with("EndGlobal") {
            return Err(MalformedSolutionError::InvalidLine {
                line: line_no,
                message: format!("unexpected '{line}'"),
            });
        }
    }

    Ok(out)
}

fn header_value(line: &str, key: &str) -> Option<String> {
    let rest = line.strip_prefix(key)?.trim_start();
    let value = rest.strip_prefix('=')?;
    Some(value.trim().to_string())
}

struct DeclaredProject {
    type_id: Uuid,
    name: String,
    relative_path: String,
    id: Uuid,
}

fn parse_project_line(line: &str, line_no: usize) -> Result<DeclaredProject, MalformedSolutionError> {
    let captures = project_line()
        .captures(line)
        .ok_or_else(|| MalformedSolutionError::InvalidLine {
            line: line_no,
            message: "malformed project declaration".to_string(),
        })?;

    Ok(DeclaredProject {
        type_id: parse_guid(&captures["type"], line_no)?,
        name: captures["name"].to_string(),
        relative_path: captures["path"].to_string(),
        id: parse_guid(&captures["guid"], line_no)?,
    })
}

fn parse_guid(raw: &str, line_no: usize) -> Result<Uuid, MalformedSolutionError> {
    Uuid::parse_str(raw.trim()).map_err(|e| MalformedSolutionError::InvalidLine {
        line: line_no,
        message: format!("invalid guid '{raw}': {e}"),
    })
}

/// Consumes lines up to and including `EndProject`, returning the entries of
/// a `SolutionItems` section if there is one.
fn read_project_body<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    start: usize,
) -> Result<Vec<String>, MalformedSolutionError> {
    let mut items = Vec::new();
    let mut section: Option<(usize, bool)> = None;

    for (line_no, line) in lines.by_ref() {
        if line == "EndProject" {
            if let Some((section_start, _)) = section {
                return Err(MalformedSolutionError::Unterminated {
                    line: section_start,
                    marker: "ProjectSection",
                });
            }
            return Ok(items);
        }
        if line.starts_with("Project(") || line == "Global" {
            break;
        }

        match section {
            None => {
                if let Some(captures) = section_line().captures(line) {
                    section = Some((line_no, &captures["name"] == SOLUTION_ITEMS));
                }
            }
            Some((_, collect)) => {
                if line == "EndProjectSection" {
                    section = None;
                } else if collect {
                    if let Some((key, _)) = line.split_once('=') {
                        items.push(key.trim().to_string());
                    }
                }
            }
        }
    }

    Err(MalformedSolutionError::Unterminated {
        line: start,
        marker: "Project",
    })
}

/// Consumes lines up to and including `EndGlobal`, collecting the pairs of
/// the `NestedProjects` section.
fn read_global<'a>(
    lines: &mut impl Iterator<Item = (usize, &'a str)>,
    start: usize,
    nesting: &mut Vec<NestingPair>,
) -> Result<(), MalformedSolutionError> {
    let mut section: Option<(usize, bool)> = None;

    for (line_no, line) in lines.by_ref() {
        if line.is_empty() {
            continue;
        }

        match section {
            None => {
                if line == "EndGlobal" {
                    return Ok(());
                }
                if let Some(captures) = section_line().captures(line) {
                    section = Some((line_no, &captures["name"] == NESTED_PROJECTS));
                }
            }
            Some((section_start, is_nesting)) => {
                if line == "EndGlobalSection" {
                    section = None;
                } else if line == "EndGlobal" || line.starts_with("GlobalSection(") {
                    return Err(MalformedSolutionError::Unterminated {
                        line: section_start,
                        marker: "GlobalSection",
                    });
                } else if is_nesting {
                    let captures = nesting_line().captures(line).ok_or_else(|| {
                        MalformedSolutionError::InvalidLine {
                            line: line_no,
                            message: "malformed nesting pair".to_string(),
                        }
                    })?;
                    nesting.push(NestingPair {
                        line: line_no,
                        child: parse_guid(&captures["child"], line_no)?,
                        parent: parse_guid(&captures["parent"], line_no)?,
                    });
                }
            }
        }
    }

    match section {
        Some((section_start, _)) => Err(MalformedSolutionError::Unterminated {
            line: section_start,
            marker: "GlobalSection",
        }),
        None => Err(MalformedSolutionError::Unterminated {
            line: start,
            marker: "Global",
        }),
    }
}

fn apply_nesting(declarations: &mut Declarations) {
    let folder_index: HashMap<Uuid, usize> = declarations
        .folders
        .iter()
        .enumerate()
        .map(|(i, f)| (f.id, i))
        .collect();
    let project_index: HashMap<Uuid, usize> = declarations
        .projects
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id, i))
        .collect();

    for pair in &declarations.nesting {
        let NestingPair {
            line,
            child,
            parent,
        } = *pair;

        let child_known = folder_index.contains_key(&child) || project_index.contains_key(&child);
        let parent_known = folder_index.contains_key(&parent) || project_index.contains_key(&parent);
        if !child_known || !parent_known {
            declarations.warnings.push(ParseWarning::UnknownNestedGuid {
                line,
                child,
                parent,
            });
            continue;
        }

        if !folder_index.contains_key(&parent) {
            declarations.warnings.push(ParseWarning::ParentNotAFolder {
                line,
                child,
                parent,
            });
            continue;
        }

        if let Some(&folder) = folder_index.get(&child) {
            if creates_cycle(&declarations.folders, &folder_index, child, parent) {
                declarations.warnings.push(ParseWarning::NestingCycle {
                    line,
                    child,
                    parent,
                });
                continue;
            }
            declarations.folders[folder].parent_folder_id = Some(parent);
        } else if let Some(&project) = project_index.get(&child) {
            declarations.projects[project].parent_folder_id = Some(parent);
        }
    }
}

/// Walks up from `parent` through the folder parents assigned so far.
fn creates_cycle(
    folders: &[SolutionFolder],
    index: &HashMap<Uuid, usize>,
    child: Uuid,
    parent: Uuid,
) -> bool {
    let mut current = Some(parent);
    let mut steps = 0;
    while let Some(id) = current {
        if id == child {
            return true;
        }
        steps += 1;
        if steps > folders.len() {
            return true;
        }
        current = index.get(&id).and_then(|&i| folders[i].parent_folder_id);
    }
    false
}

/// Rewrites the declaration line of `id` with a new name and, if given, a
/// new relative path. Every other byte of `text` is kept, line endings
/// included. Returns `None` when no declaration has that guid.
pub fn rename_declaration(
    text: &str,
    id: Uuid,
    new_name: &str,
    new_relative_path: Option<&str>,
) -> Result<Option<String>, MalformedSolutionError> {
    let mut out = String::with_capacity(text.len() + new_name.len());
    let mut renamed = false;

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let content = line.trim_end_matches(['\r', '\n']);
        let trimmed = content.trim();
        if renamed || !trimmed.starts_with("Project(") {
            out.push_str(line);
            continue;
        }

        let declared = parse_project_line(trimmed, index + 1)?;
        if declared.id != id {
            out.push_str(line);
            continue;
        }

        let Some(captures) = project_line().captures(trimmed) else {
            out.push_str(line);
            continue;
        };
        let indent = &content[..content.len() - content.trim_start().len()];
        let relative_path = new_relative_path.unwrap_or(&declared.relative_path);
        out.push_str(&format!(
            "{indent}Project(\"{}\") = \"{new_name}\", \"{relative_path}\", \"{}\"",
            &captures["type"], &captures["guid"]
        ));
        out.push_str(&line[content.len()..]);
        renamed = true;
    }

    Ok(renamed.then_some(out))
}
