//! Command dispatch
//!
//! Every mutating command loads the snapshot, runs one versioned service
//! operation and writes the result back atomically.

use std::collections::BTreeSet;
use std::io;

use clap::CommandFactory;
use clap_complete::generate;
use tracing::{debug, instrument};

use crate::application::services::{Committed, TreeService};
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::render::label;
use crate::domain::{
    ActionKind, AttrsPatch, EmployeeRef, ModuleAttrs, ModulePatch, ModuleToggle, Node, NodeAttrs,
    NodeId, NodeKind, OrgUnitAttrs, OrgUnitPatch, TreeSnapshot, UnitType,
};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Config { command } => _config(&load_settings(cli)?, command),
        Commands::Init { force } => _init(&ServiceContainer::new(load_settings(cli)?), *force),
        Commands::Show { root, json } => _show(&Session::open(cli)?, *root, *json),
        Commands::AddUnit {
            name,
            code,
            unit_type,
            parent,
            after,
            employees,
        } => _add_unit(&Session::open(cli)?, name, code, *unit_type, *parent, *after, employees),
        Commands::AddModule {
            name,
            parent,
            after,
            actions,
            href,
        } => _add_module(&Session::open(cli)?, name, *parent, *after, actions, href.as_deref()),
        Commands::Update {
            node,
            name,
            code,
            unit_type,
            href,
            clear_href,
        } => {
            let session = Session::open(cli)?;
            let kind = session.service.get(*node)?.kind();
            let patch = match kind {
                NodeKind::OrgUnit => AttrsPatch::OrgUnit(OrgUnitPatch {
                    name: name.clone(),
                    code: code.clone(),
                    unit_type: *unit_type,
                }),
                NodeKind::Module => {
                    let href = if *clear_href { Some(None) } else { href.clone().map(Some) };
                    AttrsPatch::Module(ModulePatch {
                        name: name.clone(),
                        href,
                        is_active: None,
                    })
                }
            };
            _update(&session, *node, patch)
        }
        Commands::Move { node, new_parent } => {
            let session = Session::open(cli)?;
            let committed = session
                .service
                .move_node(session.expected, *node, *new_parent)?;
            session.report("moved", committed)
        }
        Commands::Reorder { a, b } => {
            let session = Session::open(cli)?;
            let committed = session.service.reorder_siblings(session.expected, *a, *b)?;
            session.report("reordered", committed)
        }
        Commands::Toggle { module, action } => {
            let session = Session::open(cli)?;
            let toggle = action.map(ModuleToggle::Action).unwrap_or(ModuleToggle::Module);
            let committed = session.service.toggle_module(session.expected, *module, toggle)?;
            session.report("toggled", committed)
        }
        Commands::Activate { unit, off, subtree } => _activate(&Session::open(cli)?, *unit, !*off, *subtree),
        Commands::Assign { unit, employee } => {
            let session = Session::open(cli)?;
            let committed = session
                .service
                .assign_employee(session.expected, *unit, EmployeeRef::new(employee.as_str()))?;
            session.report("assigned", committed)
        }
        Commands::Unassign { employee } => {
            let session = Session::open(cli)?;
            let committed = session
                .service
                .unassign_employee(session.expected, &EmployeeRef::new(employee.as_str()))?;
            session.report("unassigned", committed)
        }
        Commands::Impact { node } => _impact(&Session::open(cli)?, *node),
        Commands::Delete { node, confirm } => _delete(&Session::open(cli)?, *node, confirm),
        Commands::Layout { root, expand, all } => _layout(&Session::open(cli)?, *root, expand, *all),
    }
}

/// Settings with the `--file` override applied.
fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(file) = &cli.file {
        settings.data_file = file.clone();
    }
    debug!(data_file = %settings.data_file.display(), "settings loaded");
    Ok(settings)
}

/// One load → operate → save cycle.
struct Session {
    container: ServiceContainer,
    service: TreeService,
    /// Version of the snapshot as loaded
    base_version: u64,
    /// Version requested with `--expect-version`
    expected: Option<u64>,
}

impl Session {
    fn open(cli: &Cli) -> CliResult<Self> {
        let container = ServiceContainer::new(load_settings(cli)?);
        let service = container.open()?;
        let base_version = service.version()?;
        Ok(Self {
            container,
            service,
            base_version,
            expected: cli.expect_version,
        })
    }

    /// Write the tree back unless the operation left it untouched.
    fn save(&self) -> CliResult<u64> {
        let version = self.service.version()?;
        if version == self.base_version {
            debug!(version, "tree unchanged, not writing");
            return Ok(version);
        }
        Ok(self.container.persist(&self.service, self.base_version)?)
    }

    /// Persist and list the changed nodes.
    fn report(&self, verb: &str, committed: Committed<Vec<Node>>) -> CliResult<()> {
        let version = self.save()?;
        if committed.value.is_empty() {
            output::success(&format!("nothing {verb}, tree unchanged (version {version})"));
            return Ok(());
        }
        output::success(&format!("{} {} node(s) (version {})", verb, committed.value.len(), version));
        for node in &committed.value {
            output::changed(&format!("{}  {}", node.id, label(node)));
        }
        Ok(())
    }
}

#[instrument(skip(container))]
fn _init(container: &ServiceContainer, force: bool) -> CliResult<()> {
    let path = container.settings.data_file.clone();
    if path.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }
    container.repo.save(&TreeSnapshot::empty(), None)?;
    output::success(&format!("created {}", path.display()));
    Ok(())
}

#[instrument(skip(session))]
fn _show(session: &Session, root: Option<NodeId>, json: bool) -> CliResult<()> {
    if json {
        let snapshot = session.service.snapshot()?;
        let text = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| InfraError::serialization("snapshot", e))?;
        output::info(&text);
        return Ok(());
    }
    output::info(&session.service.render(root)?);
    let unassigned = session.service.unassigned_employees()?;
    if !unassigned.is_empty() {
        output::header(&"Unassigned employees");
        for employee in unassigned {
            output::detail(&employee);
        }
    }
    Ok(())
}

#[instrument(skip(session))]
fn _add_unit(
    session: &Session,
    name: &str,
    code: &str,
    unit_type: UnitType,
    parent: Option<NodeId>,
    after: Option<i64>,
    employees: &[String],
) -> CliResult<()> {
    let attrs = OrgUnitAttrs::new(name, code, unit_type).with_employees(employees.iter().map(String::as_str));
    let committed = session.service.create_node(
        session.expected,
        parent,
        NodeKind::OrgUnit,
        after,
        NodeAttrs::OrgUnit(attrs),
    )?;
    created(session, committed)
}

#[instrument(skip(session))]
fn _add_module(
    session: &Session,
    name: &str,
    parent: Option<NodeId>,
    after: Option<i64>,
    actions: &[ActionKind],
    href: Option<&str>,
) -> CliResult<()> {
    let mut attrs = ModuleAttrs::new(name).with_actions(actions.iter().copied());
    if let Some(href) = href {
        attrs = attrs.with_href(href);
    }
    let committed = session.service.create_node(
        session.expected,
        parent,
        NodeKind::Module,
        after,
        NodeAttrs::Module(attrs),
    )?;
    created(session, committed)
}

fn created(session: &Session, committed: Committed<Node>) -> CliResult<()> {
    let version = session.save()?;
    output::success(&format!("created {} (version {})", committed.value.id, version));
    output::detail(&label(&committed.value));
    Ok(())
}

#[instrument(skip(session))]
fn _update(session: &Session, node: NodeId, patch: AttrsPatch) -> CliResult<()> {
    let committed = session.service.update_node(session.expected, node, patch)?;
    let version = session.save()?;
    output::success(&format!("updated {} (version {})", node, version));
    output::detail(&label(&committed.value));
    Ok(())
}

#[instrument(skip(session))]
fn _activate(session: &Session, unit: NodeId, active: bool, subtree: bool) -> CliResult<()> {
    let verb = if active { "activated" } else { "deactivated" };
    if subtree {
        let committed = session.service.set_subtree_active(session.expected, unit, active)?;
        return session.report(verb, committed);
    }
    let committed = session.service.set_active(session.expected, unit, active)?;
    let version = session.save()?;
    output::success(&format!("{} {} (version {})", verb, unit, version));
    output::detail(&label(&committed.value));
    Ok(())
}

#[instrument(skip(session))]
fn _impact(session: &Session, node: NodeId) -> CliResult<()> {
    let target = session.service.get(node)?;
    let impact = session.service.get_delete_impact(node)?;
    output::header(&format!("Deleting '{}' would remove", target.name()));
    output::action("units", &impact.unit_count);
    output::action("affected employees", &impact.affected_employee_count);
    Ok(())
}

#[instrument(skip(session, confirm))]
fn _delete(session: &Session, node: NodeId, confirm: &str) -> CliResult<()> {
    let committed = session.service.delete_node(session.expected, node, confirm)?;
    let version = session.save()?;
    output::success(&format!(
        "deleted {} unit(s), {} employee(s) unassigned (version {})",
        committed.value.unit_count, committed.value.affected_employee_count, version
    ));
    if committed.value.affected_employee_count > 0 {
        output::warning(&"detached employees are listed by `orgtree show`");
    }
    Ok(())
}

#[instrument(skip(session))]
fn _layout(session: &Session, root: NodeId, expand: &[NodeId], all: bool) -> CliResult<()> {
    let expanded: BTreeSet<NodeId> = if all {
        session
            .service
            .query(|engine| Ok(engine.store().subtree(root)?.map(|(id, _)| id).collect()))?
    } else {
        expand.iter().copied().collect()
    };
    let layout = session.service.compute_layout(root, &expanded)?;
    let text = serde_json::to_string_pretty(&layout).map_err(|e| InfraError::serialization("layout", e))?;
    output::info(&text);
    Ok(())
}

#[instrument(skip(settings))]
fn _config(settings: &Settings, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => output::info(&settings.to_toml()?),
        ConfigCommands::Path => {
            let global = global_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unavailable>".into());
            output::action("global", &global);
            output::action("local", &local_config_path().display());
            output::action("data", &settings.data_file.display());
        }
        ConfigCommands::Template => output::info(&Settings::template()),
    }
    Ok(())
}
