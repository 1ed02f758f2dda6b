use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Urgency bucket assigned to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            other => Err(format!("unknown task priority: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_urgency() {
        assert!(TaskPriority::Low < TaskPriority::Medium);
        assert!(TaskPriority::High < TaskPriority::Critical);
    }

    #[test]
    fn serde_roundtrip() {
        let json = serde_json::to_string(&TaskPriority::Critical).unwrap();
        assert_eq!(json, r#""critical""#);
        let back: TaskPriority = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TaskPriority::Critical);
    }
}
