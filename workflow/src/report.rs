use crate::aggregate;
use crate::execution::ExecutionRecord;
use crate::flow::Flow;
use crate::sequence;
use crate::sequence::LockState;
use crate::unit;
use crate::unit::UnitPath;
use textwrap::Options;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
    pub path: UnitPath,
    pub depth: usize,
    pub level: String,
    pub name: String,
    pub tags: Vec<String>,
    /// `None` on levels without a done checkbox.
    pub completed: Option<bool>,
    pub lock: Option<LockState>,
    pub grade: Option<f64>,
    /// `None` on levels without a progress bar.
    pub progress: Option<u8>,
}

/// Render-time view of a flow: every derived value is computed fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub flow_id: String,
    pub flow_name: String,
    pub template_name: String,
    pub linked_with: Vec<String>,
    pub enforce_sequence: bool,
    pub lines: Vec<ReportLine>,
}

impl FlowReport {
    pub fn build(
        flow: &Flow,
        record: Option<&ExecutionRecord>,
        enforce_sequence: bool,
        linked_with: Vec<String>,
    ) -> Self {
        let template = &flow.template_snapshot;
        let locks = sequence::flow_locks(flow, record, enforce_sequence);
        let mut lines = Vec::new();
        unit::walk(&flow.data, &mut |unit, depth, path| {
            let Some(level) = template.level(depth) else {
                return;
            };
            let config = &level.unit_config;
            lines.push(ReportLine {
                path: path.clone(),
                depth,
                level: level.singular_name.clone(),
                name: unit.name.clone(),
                tags: unit.tags.clone(),
                completed: config
                    .enable_done
                    .then(|| record.is_some_and(|r| r.is_completed(&unit.id))),
                lock: locks.get(&unit.id).copied(),
                grade: if config.enable_grade {
                    aggregate::cumulative_grade(unit, template, depth)
                } else {
                    None
                },
                progress: config
                    .progress_bar
                    .then(|| aggregate::progress(unit, template, depth, record)),
            });
        });
        Self {
            flow_id: flow.id.clone(),
            flow_name: flow.name.clone(),
            template_name: template.name.clone(),
            linked_with,
            enforce_sequence,
            lines,
        }
    }

    pub fn render(&self, width: usize) -> String {
        let mut out = format!(
            "Flow: {} ({})\nTemplate: {}\n",
            self.flow_name, self.flow_id, self.template_name
        );
        if !self.linked_with.is_empty() {
            out.push_str(&format!("Linked with: {}\n", self.linked_with.join(", ")));
        }
        if self.enforce_sequence {
            out.push_str("Sequence enforced\n");
        }
        for line in &self.lines {
            let indent = "  ".repeat(line.depth);
            let mark = match line.completed {
                Some(true) => "[x] ",
                Some(false) => "[ ] ",
                None => "",
            };
            let mut text = format!("{mark}{} {}: {}", line.path, line.level, line.name);
            if !line.tags.is_empty() {
                text.push_str(&format!(" #{}", line.tags.join(" #")));
            }
            if let Some(grade) = line.grade {
                text.push_str(&format!(" | grade {grade}"));
            }
            if let Some(progress) = line.progress {
                text.push_str(&format!(" | {progress}%"));
            }
            if line.lock == Some(LockState::Locked) {
                text.push_str(" | locked");
            }
            let subsequent = format!("{indent}    ");
            let options = Options::new(width.max(20))
                .initial_indent(&indent)
                .subsequent_indent(&subsequent);
            out.push_str(&textwrap::fill(&text, options));
            out.push('\n');
        }
        out
    }
}
