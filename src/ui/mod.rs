// Terminal reports for Exliar VFIO
//
// Human-readable summaries of bind passes and resource groups. Colors are
// only used when stdout is a terminal.

pub mod colors;

use std::io::{self, IsTerminal};

use colors::{Painter, Theme};

use crate::core::pipeline::{BindReport, BindStatus};
use crate::pci::VfioGroup;

/// Painter matching the current stdout
pub fn stdout_painter() -> Painter {
    Painter::new(Theme::default(), io::stdout().is_terminal())
}

/// Renders resource groups, one block per resource
pub fn render_groups(groups: &[VfioGroup], painter: &Painter) -> String {
    let theme = painter.theme();
    if groups.is_empty() {
        return format!("{}\n", painter.paint("No VFIO resources found", theme.warning));
    }

    let mut out = format!("{}\n", painter.bold(&format!("VFIO resources ({})", groups.len()), theme.heading));
    for group in groups {
        out.push_str(&format!(
            "  {} ({} device(s))\n",
            painter.bold(&group.resource_name, theme.resource),
            group.pci_addresses.len()
        ));
        for (address, iommu_group) in group.pci_addresses.iter().zip(&group.iommu_groups) {
            out.push_str(&format!(
                "    {}  {}\n",
                address,
                painter.paint(&format!("/dev/vfio/{}", iommu_group), theme.detail)
            ));
        }
    }
    out
}

/// Renders the per-device outcome of a bind pass
pub fn render_bind_report(report: &BindReport, painter: &Painter) -> String {
    let theme = painter.theme();
    let mut out = format!("{}\n", painter.bold("Bind results", theme.heading));

    for id in &report.registered_ids {
        out.push_str(&format!("  new_id {}\n", painter.paint(id, theme.detail)));
    }

    for outcome in &report.outcomes {
        let line = match &outcome.status {
            BindStatus::Bound { .. } => painter.paint("bound", theme.success),
            BindStatus::AlreadyBound => painter.paint("already bound", theme.detail),
            BindStatus::Failed { error, journal } => {
                let mut text = painter.paint(&format!("failed: {}", error), theme.error);
                if let Some(journal) = journal.as_ref().filter(|j| j.left_unbound()) {
                    text.push_str(&painter.paint(
                        &format!(" (left without a driver after: {})", journal.summary()),
                        theme.warning,
                    ));
                }
                text
            }
        };
        out.push_str(&format!("  {} [{}] {}\n", outcome.address, outcome.resource, line));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::BindOutcome;
    use crate::core::state::{BindJournal, BindStep};

    #[test]
    fn test_render_groups_plain() {
        let groups = vec![VfioGroup {
            resource_name: "npu".to_string(),
            iommu_groups: vec![7, 8],
            pci_addresses: vec!["0000:01:00.0".to_string(), "0000:c0:00.0".to_string()],
        }];
        let text = render_groups(&groups, &Painter::plain());
        assert_eq!(
            text,
            "VFIO resources (1)\n  npu (2 device(s))\n    0000:01:00.0  /dev/vfio/7\n    0000:c0:00.0  /dev/vfio/8\n"
        );
    }

    #[test]
    fn test_render_empty_groups() {
        assert_eq!(render_groups(&[], &Painter::plain()), "No VFIO resources found\n");
    }

    #[test]
    fn test_render_bind_failure_mentions_unbound_device() {
        let mut journal = BindJournal::new("0000:01:00.0");
        journal.record(BindStep::ExistenceCheck, "");
        journal.record(BindStep::IommuCheck, "");
        journal.record(BindStep::Unbind, "");
        let report = BindReport {
            outcomes: vec![BindOutcome {
                resource: "npu".to_string(),
                address: "0000:01:00.0".to_string(),
                status: BindStatus::Failed { error: "driver_override error".to_string(), journal: Some(journal) },
            }],
            registered_ids: vec![],
        };

        let text = render_bind_report(&report, &Painter::plain());
        assert!(text.contains("0000:01:00.0 [npu] failed: driver_override error"));
        assert!(text.contains("left without a driver"));
    }
}
