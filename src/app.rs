use anyhow::Result;

use crate::input::Action;
use crate::model::{CombinedResources, GroupedRow, ResourceKind, UpdateResponse};
use crate::view::{ClusterResourceViewModel, LoadRequest, UpdateRequest, ViewCommand};

/// One table line: a row of a kind, in namespace order.
#[derive(Debug, Clone, Copy)]
pub struct DisplayRow<'a> {
    pub kind: ResourceKind,
    pub row: &'a GroupedRow,
}

/// Terminal state around the view model: selection, help and status line.
pub struct App {
    view: ClusterResourceViewModel,
    running: bool,
    show_help: bool,
    status: String,
    selected: usize,
    page_size: usize,
}

impl App {
    pub fn new(view: ClusterResourceViewModel) -> Self {
        Self {
            view,
            running: true,
            show_help: false,
            status: "Ready".to_string(),
            selected: 0,
            page_size: 10,
        }
    }

    pub fn view(&self) -> &ClusterResourceViewModel {
        &self.view
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn set_page_size(&mut self, rows: usize) {
        self.page_size = rows.max(1);
    }

    pub fn refresh(&mut self) -> Vec<ViewCommand> {
        self.set_status("Refreshing clusters…");
        self.view.refresh_data()
    }

    pub fn apply_load(
        &mut self,
        request: LoadRequest,
        result: Result<CombinedResources>,
    ) -> Vec<ViewCommand> {
        let commands = self.view.apply_load(request, result);
        if !self.view.loading() {
            let total = self.view.total_resources_count();
            self.set_status(format!("Loaded {total} workloads"));
        }
        self.clamp_selection();
        commands
    }

    pub fn apply_update_check(&mut self, request: UpdateRequest, result: Result<UpdateResponse>) {
        self.view.apply_update_check(request, result);
    }

    pub fn visible_rows(&self) -> Vec<DisplayRow<'_>> {
        let mut rows = Vec::new();
        for bucket in self.view.group_resources_by_namespace().into_values() {
            for kind in ResourceKind::ALL {
                rows.extend(
                    bucket
                        .get(kind)
                        .iter()
                        .map(|row| DisplayRow { kind, row: *row }),
                );
            }
        }
        rows
    }

    pub fn apply_action(&mut self, action: Action) -> Vec<ViewCommand> {
        if self.show_help && !matches!(action, Action::ToggleHelp | Action::Quit) {
            self.show_help = false;
            if matches!(action, Action::Dismiss) {
                return Vec::new();
            }
        }

        let commands = match action {
            Action::Quit => {
                self.running = false;
                self.set_status("Exit requested");
                Vec::new()
            }
            Action::Down => {
                self.move_selection(1);
                Vec::new()
            }
            Action::Up => {
                self.move_selection(-1);
                Vec::new()
            }
            Action::PageDown => {
                self.move_selection(self.page_size as isize);
                Vec::new()
            }
            Action::PageUp => {
                self.move_selection(-(self.page_size as isize));
                Vec::new()
            }
            Action::Top => {
                self.selected = 0;
                Vec::new()
            }
            Action::Bottom => {
                self.selected = self.visible_rows().len().saturating_sub(1);
                Vec::new()
            }
            Action::Refresh => self.refresh(),
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                Vec::new()
            }
            Action::ToggleDivergent => {
                let enabled = !self.view.show_only_different_versions();
                self.set_status(if enabled {
                    "Showing only workloads with diverging versions"
                } else {
                    "Showing all workloads"
                });
                self.view.set_show_only_different_versions(enabled)
            }
            Action::ToggleUpdates => {
                let enabled = !self.view.check_for_updates();
                self.set_status(if enabled {
                    "Update checks enabled"
                } else {
                    "Update checks disabled"
                });
                self.view.set_check_for_updates(enabled)
            }
            Action::CycleNamespace => self.cycle_namespace(),
            Action::CycleKind => self.cycle_kind(),
            Action::ToggleCluster(slot) => self.toggle_cluster_slot(slot),
            Action::ResetFilters => {
                self.set_status("Filters reset");
                self.view.reset_filters()
            }
            Action::Dismiss => Vec::new(),
        };

        self.clamp_selection();
        commands
    }

    /// Steps through "all namespaces" and then each known namespace.
    fn cycle_namespace(&mut self) -> Vec<ViewCommand> {
        let namespaces = self.view.namespaces().to_vec();
        let next = next_in_cycle(&namespaces, self.view.selected_namespaces());
        self.set_status(match &next {
            Some(namespace) => format!("Namespace: {namespace}"),
            None => "Namespace: all".to_string(),
        });
        self.view.set_selected_namespaces(next.into_iter().collect())
    }

    fn cycle_kind(&mut self) -> Vec<ViewCommand> {
        let next = next_in_cycle(&ResourceKind::ALL, self.view.selected_resource_types());
        self.set_status(match next {
            Some(kind) => format!("Kind: {}", kind.title()),
            None => "Kind: all".to_string(),
        });
        self.view.set_selected_resource_types(next.into_iter().collect())
    }

    fn toggle_cluster_slot(&mut self, slot: u8) -> Vec<ViewCommand> {
        let Some(cluster) = self
            .view
            .available_clusters()
            .get(usize::from(slot).saturating_sub(1))
            .cloned()
        else {
            self.set_status(format!("No cluster registered in slot {slot}"));
            return Vec::new();
        };

        let was_selected = self.view.selected_clusters().contains(&cluster.id);
        self.set_status(if was_selected {
            format!("Cluster {} deselected", cluster.name)
        } else {
            format!("Cluster {} selected", cluster.name)
        });
        self.view.toggle_cluster(&cluster.id)
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.visible_rows().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        self.selected = self.selected.saturating_add_signed(delta).min(len - 1);
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_rows().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }
}

/// Next single selection after `current`: none → first → … → last → none.
fn next_in_cycle<T: Clone + PartialEq>(options: &[T], current: &[T]) -> Option<T> {
    match current {
        [] => options.first().cloned(),
        [single] => options
            .iter()
            .position(|option| option == single)
            .and_then(|idx| options.get(idx + 1))
            .cloned(),
        _ => None,
    }
}
