// src/input.rs - Text input formats for processes, commands and memory size
use std::path::Path;

use procsim_shared::{Command, ProcessDescriptor, SimError};

/// Parses `arrival burst` pairs. Ids follow file position; the result is
/// stably ordered by arrival and scaled by `time_scale`.
pub fn parse_processes(text: &str, time_scale: f64) -> Result<Vec<ProcessDescriptor>, SimError> {
    let numbers: Vec<&str> = text.split_whitespace().collect();
    if numbers.len() % 2 != 0 {
        return Err(SimError::malformed(format!(
            "process file holds {} numbers, expected arrival/burst pairs",
            numbers.len()
        )));
    }
    let mut processes = Vec::with_capacity(numbers.len() / 2);
    for (position, pair) in numbers.chunks(2).enumerate() {
        let arrival: i64 = pair[0].parse().map_err(|_| {
            SimError::malformed(format!("process {}: arrival '{}' is not an integer", position, pair[0]))
        })?;
        let burst: f64 = pair[1].parse().map_err(|_| {
            SimError::malformed(format!("process {}: burst '{}' is not a number", position, pair[1]))
        })?;
        if arrival < 1 {
            return Err(SimError::malformed(format!(
                "process {} arrives at {}, before the simulation starts",
                position, arrival
            )));
        }
        let descriptor = ProcessDescriptor::new(position.to_string(), arrival as f64 * time_scale, burst * time_scale);
        descriptor.validate()?;
        processes.push(descriptor);
    }
    processes.sort_by(|a, b| a.arrival.total_cmp(&b.arrival));
    Ok(processes)
}

/// One command per line; blank lines are skipped.
pub fn parse_commands(text: &str) -> Result<Vec<Command>, SimError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            line.parse::<Command>().map_err(|e| match e {
                SimError::MalformedInput(reason) => {
                    SimError::malformed(format!("command line {}: {}", n + 1, reason))
                }
                other => other,
            })
        })
        .collect()
}

/// Reads main-memory capacity from the first number in the file.
pub fn parse_capacity(text: &str) -> Result<usize, SimError> {
    let first = text
        .split_whitespace()
        .next()
        .ok_or_else(|| SimError::malformed("memory config is empty"))?;
    let capacity: i64 = first
        .parse()
        .map_err(|_| SimError::malformed(format!("memory capacity '{}' is not an integer", first)))?;
    if capacity < 1 {
        return Err(SimError::ResourceUnavailable(format!(
            "main memory needs at least one page, got {}",
            capacity
        )));
    }
    Ok(capacity as usize)
}

async fn read(path: &Path) -> Result<String, SimError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        tracing::error!("Failed to read {}: {}", path.display(), e);
        SimError::Io(e)
    })
}

pub async fn load_processes(path: impl AsRef<Path>, time_scale: f64) -> Result<Vec<ProcessDescriptor>, SimError> {
    let processes = parse_processes(&read(path.as_ref()).await?, time_scale)?;
    tracing::info!("Loaded {} process(es) from {}", processes.len(), path.as_ref().display());
    Ok(processes)
}

pub async fn load_commands(path: impl AsRef<Path>) -> Result<Vec<Command>, SimError> {
    let commands = parse_commands(&read(path.as_ref()).await?)?;
    tracing::info!("Loaded {} command(s) from {}", commands.len(), path.as_ref().display());
    Ok(commands)
}

pub async fn load_capacity(path: impl AsRef<Path>) -> Result<usize, SimError> {
    parse_capacity(&read(path.as_ref()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_processes_are_scaled_and_sorted() {
        let processes = parse_processes("3 2\n1 5\n1 0.5\n", 1000.0).unwrap();
        let ids: Vec<&str> = processes.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "0"]);
        assert_eq!(processes[0].arrival, 1000.0);
        assert_eq!(processes[0].burst, 5000.0);
        assert_eq!(processes[1].burst, 500.0);
    }

    #[test]
    fn test_process_file_errors() {
        assert!(matches!(parse_processes("1 2 3", 1.0), Err(SimError::MalformedInput(_))));
        assert!(matches!(parse_processes("0 2", 1.0), Err(SimError::MalformedInput(_))));
        assert!(matches!(parse_processes("1 -2", 1.0), Err(SimError::MalformedInput(_))));
        assert!(matches!(parse_processes("x 2", 1.0), Err(SimError::MalformedInput(_))));
        assert!(parse_processes("", 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_commands_skip_blank_lines() {
        let commands = parse_commands("Store 1 5\n\n  lookup 1\nRELEASE 1\n").unwrap();
        assert_eq!(
            commands,
            vec![Command::store("1", "5"), Command::lookup("1"), Command::release("1")]
        );
        let err = parse_commands("Store 1 5\nFetch 2\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_capacity() {
        assert_eq!(parse_capacity("2\n").unwrap(), 2);
        assert!(matches!(parse_capacity("0"), Err(SimError::ResourceUnavailable(_))));
        assert!(matches!(parse_capacity("-3"), Err(SimError::ResourceUnavailable(_))));
        assert!(matches!(parse_capacity("two"), Err(SimError::MalformedInput(_))));
        assert!(matches!(parse_capacity(""), Err(SimError::MalformedInput(_))));
    }

    #[tokio::test]
    async fn test_load_from_files() {
        let dir = tempdir().unwrap();
        let processes = dir.path().join("processes.txt");
        let memconfig = dir.path().join("memconfig.txt");
        tokio::fs::write(&processes, "1 3\n2 1\n").await.unwrap();
        tokio::fs::write(&memconfig, "2").await.unwrap();
        assert_eq!(load_processes(&processes, 1.0).await.unwrap().len(), 2);
        assert_eq!(load_capacity(&memconfig).await.unwrap(), 2);
        assert!(matches!(
            load_commands(dir.path().join("missing.txt")).await,
            Err(SimError::Io(_))
        ));
    }
}
