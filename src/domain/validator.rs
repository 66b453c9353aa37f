//! Update-time invariant checks for a single node edit.
//!
//! Pure functions over the proposed values; they never touch the node.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;

static GROUP_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9._:-]+$").expect("group name pattern is valid")
});

/// Minimum selected disks per RAID level. Levels not listed have no minimum.
pub fn raid_min_disks(raid_type: &str) -> Option<usize> {
    match raid_type {
        "raid1" => Some(2),
        "raid5" => Some(3),
        "raid6" | "raid10" => Some(4),
        _ => None,
    }
}

/// An empty group means "automatic" and is always accepted.
pub fn validate_group(group: Option<&str>) -> Result<(), ValidationError> {
    match group {
        Some(group) if !group.is_empty() && !GROUP_NAME.is_match(group) => {
            Err(ValidationError::InvalidGroupName {
                group: group.to_string(),
            })
        }
        _ => Ok(()),
    }
}

pub fn validate_raid(raid_type: Option<&str>, disks_selected: usize) -> Result<(), ValidationError> {
    let Some(raid_type) = raid_type else {
        return Ok(());
    };
    match raid_min_disks(raid_type) {
        Some(required) if disks_selected < required => {
            Err(ValidationError::InsufficientRaidDisks {
                raid_type: raid_type.to_string(),
                required,
                selected: disks_selected,
            })
        }
        _ => Ok(()),
    }
}

/// Run both checks, group first.
pub fn validate(
    group: Option<&str>,
    raid_type: Option<&str>,
    raid_disks: Option<&[String]>,
) -> Result<(), ValidationError> {
    validate_group(group)?;
    validate_raid(raid_type, raid_disks.map_or(0, <[String]>::len))
}
