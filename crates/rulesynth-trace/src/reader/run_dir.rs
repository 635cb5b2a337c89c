//! Directories of raw planner run logs.
//!
//! Every directory (searched recursively, in name order) that contains
//! `beliefsPerStep.csv`, `policyPerStep.txt` and `stateEvolution.csv` is
//! one run:
//!
//! - `beliefsPerStep.csv`: one line per step, `state:particles` entries
//!   separated by commas;
//! - `stateEvolution.csv`: row 1 holds the segment of each step and row 8
//!   the action code of each step; the first column is a row label.
//!
//! Particle states encode one difficulty digit (base 3) per segment. The
//! belief of a step is the particle mass over the difficulty of the step's
//! segment, normalized.

use std::fs;
use std::path::{Path, PathBuf};

use crate::belief::BeliefDistribution;
use crate::error::TraceError;
use crate::trace::{ActionLabel, BeliefTrace, Run, StepContext, TraceStep};

pub const BELIEFS_FILE: &str = "beliefsPerStep.csv";
pub const POLICY_FILE: &str = "policyPerStep.txt";
pub const STATE_EVOLUTION_FILE: &str = "stateEvolution.csv";

/// Number of path segments encoded in a state index.
pub const SEGMENTS: u32 = 8;
/// Difficulty levels per segment, i.e. belief labels.
pub const DIFFICULTY_LEVELS: u64 = 3;

const SEGMENT_ROW: usize = 1;
const ACTION_ROW: usize = 8;

/// Read every run below `root`.
pub fn read_run_directory(root: &Path) -> Result<BeliefTrace, TraceError> {
    let mut run_dirs = Vec::new();
    collect_run_dirs(root, &mut run_dirs)?;
    if run_dirs.is_empty() {
        return Err(TraceError::malformed(root, "no run directories found"));
    }
    let mut runs = Vec::with_capacity(run_dirs.len());
    for dir in run_dirs {
        let run = read_run(&dir, root)?;
        tracing::debug!(run = %run.id, steps = run.steps.len(), "read run");
        runs.push(run);
    }
    BeliefTrace::new(runs)
}

fn is_run_dir(dir: &Path) -> bool {
    [BELIEFS_FILE, POLICY_FILE, STATE_EVOLUTION_FILE]
        .iter()
        .all(|name| dir.join(name).is_file())
}

fn collect_run_dirs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), TraceError> {
    if is_run_dir(dir) {
        out.push(dir.to_path_buf());
    }
    let entries = fs::read_dir(dir).map_err(|e| TraceError::io(dir, e))?;
    let mut children = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TraceError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            children.push(path);
        }
    }
    children.sort();
    for child in children {
        collect_run_dirs(&child, out)?;
    }
    Ok(())
}

fn read_run(dir: &Path, root: &Path) -> Result<Run, TraceError> {
    let evolution_path = dir.join(STATE_EVOLUTION_FILE);
    let evolution =
        fs::read_to_string(&evolution_path).map_err(|e| TraceError::io(&evolution_path, e))?;
    let (segments, actions) = parse_state_evolution(&evolution, &evolution_path)?;

    let beliefs_path = dir.join(BELIEFS_FILE);
    let beliefs_text =
        fs::read_to_string(&beliefs_path).map_err(|e| TraceError::io(&beliefs_path, e))?;
    let particles = parse_beliefs(&beliefs_text, &beliefs_path)?;

    let id = dir
        .strip_prefix(root)
        .ok()
        .map(|p| p.display().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| dir.display().to_string());

    let mut steps = Vec::with_capacity(particles.len());
    for (i, step_particles) in particles.iter().enumerate() {
        let segment = *segments.get(i).ok_or_else(|| {
            TraceError::malformed(&evolution_path, format!("no segment for step {}", i + 1))
        })?;
        let action = *actions.get(i).ok_or_else(|| {
            TraceError::malformed(&evolution_path, format!("no action for step {}", i + 1))
        })?;
        let counts = project_segment_difficulty(step_particles, segment)
            .ok_or_else(|| {
                TraceError::malformed(
                    &evolution_path,
                    format!("segment {segment} out of range at step {}", i + 1),
                )
            })?;
        let belief =
            BeliefDistribution::from_particles(&counts).map_err(|source| TraceError::InvalidStep {
                run: id.clone(),
                step: i + 1,
                source: Box::new(source),
            })?;
        steps.push(TraceStep {
            step: i + 1,
            action: ActionLabel::Code(action),
            belief,
            context: StepContext {
                segment: Some(segment),
                ..StepContext::default()
            },
        });
    }
    Ok(Run { id, steps })
}

/// Segments (row 1) and action codes (row 8), skipping the label column.
pub fn parse_state_evolution(
    text: &str,
    file: &Path,
) -> Result<(Vec<usize>, Vec<i64>), TraceError> {
    let rows: Vec<&str> = text.lines().collect();
    let row = |index: usize| -> Result<Vec<&str>, TraceError> {
        let line = rows
            .get(index)
            .ok_or_else(|| TraceError::malformed(file, format!("missing row {index}")))?;
        Ok(line
            .split(',')
            .skip(1)
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect())
    };
    let segments = row(SEGMENT_ROW)?
        .into_iter()
        .map(|cell| {
            cell.parse::<usize>()
                .map_err(|_| TraceError::malformed(file, format!("bad segment `{cell}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let actions = row(ACTION_ROW)?
        .into_iter()
        .map(|cell| {
            cell.parse::<i64>()
                .map_err(|_| TraceError::malformed(file, format!("bad action `{cell}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((segments, actions))
}

/// `(state, particles)` pairs per step.
pub fn parse_beliefs(text: &str, file: &Path) -> Result<Vec<Vec<(u64, u64)>>, TraceError> {
    let mut steps = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut entries = Vec::new();
        for entry in line.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (state, particles) = entry.split_once(':').ok_or_else(|| {
                TraceError::malformed(file, format!("line {}: bad entry `{entry}`", line_no + 1))
            })?;
            let state = state.trim().parse::<u64>().map_err(|_| {
                TraceError::malformed(file, format!("line {}: bad state `{state}`", line_no + 1))
            })?;
            let particles = particles.trim().parse::<u64>().map_err(|_| {
                TraceError::malformed(
                    file,
                    format!("line {}: bad particle count `{particles}`", line_no + 1),
                )
            })?;
            entries.push((state, particles));
        }
        steps.push(entries);
    }
    Ok(steps)
}

/// Particle counts per difficulty level of `segment`. `None` when the
/// segment is outside the encoded range.
pub fn project_segment_difficulty(particles: &[(u64, u64)], segment: usize) -> Option<Vec<u64>> {
    let segment = u32::try_from(segment).ok().filter(|s| *s < SEGMENTS)?;
    let place = DIFFICULTY_LEVELS.pow(SEGMENTS - segment - 1);
    let mut counts = vec![0u64; DIFFICULTY_LEVELS as usize];
    for &(state, n) in particles {
        let level = (state / place) % DIFFICULTY_LEVELS;
        counts[level as usize] += n;
    }
    Some(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_digit_is_taken_from_the_segment() {
        // state 2 * 3^7 has difficulty 2 in segment 0 and 0 elsewhere.
        let state = 2 * 3u64.pow(7);
        let counts = project_segment_difficulty(&[(state, 4), (1, 2)], 0).expect("segment");
        assert_eq!(counts, vec![2, 0, 4]);
        let counts = project_segment_difficulty(&[(state, 4), (1, 2)], 7).expect("segment");
        assert_eq!(counts, vec![4, 2, 0]);
        assert!(project_segment_difficulty(&[], 8).is_none());
    }

    #[test]
    fn state_evolution_rows_skip_label_column() {
        let mut text = String::new();
        text.push_str("state,1,2\n");
        text.push_str("segment,0,1,\n");
        for _ in 2..8 {
            text.push_str("x,0,0\n");
        }
        text.push_str("action,2,1\n");
        let (segments, actions) =
            parse_state_evolution(&text, Path::new("stateEvolution.csv")).expect("parsed");
        assert_eq!(segments, vec![0, 1]);
        assert_eq!(actions, vec![2, 1]);
    }

    #[test]
    fn beliefs_lines_parse_entries() {
        let parsed = parse_beliefs("1:10,2:5,\n\n7:1\n", Path::new("b.csv")).expect("parsed");
        assert_eq!(parsed, vec![vec![(1, 10), (2, 5)], vec![(7, 1)]]);
        assert!(parse_beliefs("1-10\n", Path::new("b.csv")).is_err());
    }
}
