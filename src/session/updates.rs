//! Update checks and the update flows of [`ModSession`].

use super::{run_on_worker, ModSession, ADD_DATE_FORMAT};
use crate::archive::build_mod_subtree;
use crate::destination::auto_place;
use crate::progress::ProgressSink;
use crate::tree::{NodeId, TreeError};
use crate::update::{
    check_mod, copy_destinations, has_matching_entries, AvailableUpdate, ModInfo, UpdateBehavior,
    UpdateError,
};

impl ModSession {
    /// Asks each tracked mod's site for a newer release and flags the
    /// outdated ones. Mods without a site link are skipped.
    pub fn check_for_updates(&mut self, roots: &[NodeId], sink: &dyn ProgressSink) -> Vec<AvailableUpdate> {
        self.cancel.reset();
        let tracked: Vec<NodeId> = roots
            .iter()
            .copied()
            .filter(|&id| {
                self.forest
                    .get(id)
                    .is_some_and(|n| !n.product_id().is_empty() && !n.site_handler_name().is_empty())
            })
            .collect();

        let (forest, handlers, cancel) = (&self.forest, &self.handlers, &self.cancel);
        let results = run_on_worker(tracked.len(), sink, |progress| {
            progress.started("check updates");
            let mut results = Vec::with_capacity(tracked.len());
            for &id in &tracked {
                if cancel.is_cancelled() {
                    break;
                }
                results.push((id, check_mod(handlers, &forest[id])));
                progress.node_done();
            }
            results
        });

        let mut available = Vec::new();
        for (id, result) in results {
            let Some(node) = self.forest.get_mut(id) else {
                continue;
            };
            match result {
                Ok(Some(latest)) => {
                    node.is_outdated = true;
                    let message = format!(
                        "{} is outdated ({} -> {})",
                        node, node.metadata.version, latest.version
                    );
                    self.log.info(message);
                    available.push(AvailableUpdate { node: id, latest });
                }
                Ok(None) => node.is_outdated = false,
                Err(e) => self.log.warn(e.to_string()),
            }
        }
        sink.finished(
            &format!("{} of {} mods outdated", available.len(), tracked.len()),
            None,
        );
        available
    }

    /// Checks the given mods and updates the outdated ones according to
    /// the configured [`UpdateBehavior`]. Returns the new root ids.
    pub fn update_outdated(&mut self, roots: &[NodeId], sink: &dyn ProgressSink) -> Vec<NodeId> {
        let available = self.check_for_updates(roots, sink);
        if self.settings.update_behavior == UpdateBehavior::Manual {
            if !available.is_empty() {
                self.log.info(format!(
                    "{} updates available; update behavior is manual",
                    available.len()
                ));
            }
            return Vec::new();
        }

        let mut updated = Vec::new();
        for update in available {
            if self.cancel.is_cancelled() {
                self.log.warn("Update cancelled");
                break;
            }
            let name = self
                .forest
                .get(update.node)
                .map(|n| n.to_string())
                .unwrap_or_default();
            match self.update_mod(update.node, &update.latest, sink) {
                Ok(id) => updated.push(id),
                Err(e) => self.log.error(format!("Updating {} failed: {}", name, e)),
            }
        }
        updated
    }

    /// Replaces `old` with the release described by `latest`.
    ///
    /// A mod that is not installed is simply swapped for the new release.
    /// Otherwise the old mod is uninstalled first; with
    /// [`UpdateBehavior::CopyDestination`] the new release then inherits
    /// the old placement and checked state by entry key and is installed.
    pub fn update_mod(
        &mut self,
        old: NodeId,
        latest: &ModInfo,
        sink: &dyn ProgressSink,
    ) -> Result<NodeId, UpdateError> {
        let node = self.forest.get(old).ok_or(TreeError::UnknownNode(old))?;
        let name = node.to_string();
        let handler = self
            .handlers
            .get(node.site_handler_name())
            .ok_or_else(|| UpdateError::UnknownHandler(node.site_handler_name().to_string()))?;
        let installed = node.is_installed() || self.forest.has_installed_children(old);
        let behavior = if installed {
            self.settings.update_behavior
        } else {
            UpdateBehavior::RemoveAndAdd
        };

        let download_dir = self.download_dir_for(old);
        self.log.info(format!("Downloading {} {}", name, latest.version));
        let archive = run_on_worker(1, sink, |progress| {
            progress.started("download");
            let result = handler.download_mod(latest, &download_dir);
            progress.node_done();
            result
        })
        .map_err(|source| UpdateError::Download {
            name: name.clone(),
            source,
        })?;

        let title = if latest.name.is_empty() { self.forest[old].name.as_str() } else { latest.name.as_str() };
        let mut new = build_mod_subtree(&archive, Some(title)).map_err(|source| UpdateError::Read {
            name: name.clone(),
            source,
        })?;
        latest.apply_to(&mut new.node);
        new.node.metadata.add_date = chrono::Local::now().format(ADD_DATE_FORMAT).to_string();

        let snapshot = self.forest.export(old).ok_or(TreeError::UnknownNode(old))?;
        if behavior == UpdateBehavior::CopyDestination {
            if !has_matching_entries(&snapshot, &new) {
                return Err(UpdateError::NoMatchingEntries(name));
            }
            let previous = &snapshot.node.metadata;
            new.node.metadata.note = previous.note.clone();
            if new.node.metadata.mod_url.is_empty() {
                new.node.metadata.mod_url = previous.mod_url.clone();
            }
            if new.node.metadata.additional_url.is_empty() {
                new.node.metadata.additional_url = previous.additional_url.clone();
            }
        }

        if installed {
            self.forest.uncheck_all(old);
            let report = self.run_process(&[old], sink);
            if report.failed > 0 {
                self.log
                    .warn(format!("{} files of {} could not be removed", report.failed, name));
            }
        }

        let id = self.forest.replace_mod(old, new)?;
        match behavior {
            UpdateBehavior::CopyDestination => {
                let copied = copy_destinations(&mut self.forest, &snapshot, id);
                self.log
                    .info(format!("Carried {} destinations over to the new release", copied));
                self.run_process(&[id], sink);
            }
            UpdateBehavior::RemoveAndAdd | UpdateBehavior::Manual => {
                auto_place(&mut self.forest, id);
            }
        }
        self.refresh_roots(&[id], sink);

        let message = format!("Updated {} to {}", self.forest[id], latest.version);
        self.log.info(message.as_str());
        sink.finished(&message, None);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{foo_zip, session_in};
    use super::*;
    use crate::progress::NoProgress;
    use crate::update::test_util::FakeSite;
    use anyhow::Result;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const V1: &[(&str, &str)] = &[("GameData/Foo/a.cfg", "a1"), ("GameData/Foo/b.cfg", "b1")];
    const V2: &[(&str, &str)] = &[("GameData/Foo/a.cfg", "a2"), ("GameData/Foo/c.cfg", "c2")];

    fn latest() -> ModInfo {
        ModInfo {
            name: "Foo".into(),
            product_id: "42".into(),
            site_handler_name: "FakeSite".into(),
            version: "2.0".into(),
            ..Default::default()
        }
    }

    /// Session with Foo 1.0 installed and a site offering 2.0.
    fn installed_v1(dir: &TempDir, behavior: UpdateBehavior) -> Result<(ModSession, NodeId)> {
        let mut session = session_in(dir)?;
        session.settings.update_behavior = behavior;
        session.register_site_handler(Arc::new(FakeSite {
            latest: latest(),
            archive: foo_zip(dir, "Foo-2.0.zip", V2)?,
            checks: Mutex::new(0),
        }));

        let info = ModInfo {
            version: "1.0".into(),
            ..latest()
        };
        let id = session.add_mod(&foo_zip(dir, "Foo-1.0.zip", V1)?, Some(&info))?;
        session.check_all(id);
        session.process_all(&NoProgress);
        Ok((session, id))
    }

    #[test]
    fn test_check_flags_outdated() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut session, id) = installed_v1(&dir, UpdateBehavior::Manual)?;

        let roots = session.mods().to_vec();
        let available = session.check_for_updates(&roots, &NoProgress);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].latest.version, "2.0");
        assert!(session.forest()[id].is_outdated);

        // Manual leaves the installed copy alone.
        assert!(session.update_outdated(&roots, &NoProgress).is_empty());
        assert!(session.forest().contains(id));
        assert!(dir.path().join("ksp/GameData/Foo/b.cfg").exists());
        Ok(())
    }

    #[test]
    fn test_copy_destination_reinstalls_new_release() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut session, old) = installed_v1(&dir, UpdateBehavior::CopyDestination)?;

        let roots = session.mods().to_vec();
        let updated = session.update_outdated(&roots, &NoProgress);
        assert_eq!(updated.len(), 1);
        assert!(!session.forest().contains(old));

        let new = updated[0];
        assert_eq!(session.mods(), &[new]);
        assert_eq!(session.forest()[new].metadata.version, "2.0");
        assert!(!session.forest()[new].is_outdated);

        let game_data = dir.path().join("ksp/GameData/Foo");
        assert_eq!(std::fs::read_to_string(game_data.join("a.cfg"))?, "a2");
        assert!(!game_data.join("b.cfg").exists());

        // Entries new in this release are placed but wait to be checked.
        let added = session.find_node("Foo/GameData/Foo/c.cfg").unwrap();
        assert!(!session.forest()[added].checked());
        assert!(!game_data.join("c.cfg").exists());
        Ok(())
    }

    #[test]
    fn test_remove_and_add_leaves_new_release_unchecked() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut session, _) = installed_v1(&dir, UpdateBehavior::RemoveAndAdd)?;

        let roots = session.mods().to_vec();
        let updated = session.update_outdated(&roots, &NoProgress);
        assert_eq!(updated.len(), 1);

        let new = updated[0];
        assert_eq!(session.forest().find_by_identity("42", "FakeSite"), Some(new));
        assert!(!session.forest().has_installed_children(new));
        assert!(!dir.path().join("ksp/GameData/Foo").exists());

        // Placement was redone for the new release.
        let file = session.find_node("Foo/GameData/Foo/c.cfg").unwrap();
        assert_eq!(
            crate::destination::resolve_destination(session.forest(), file),
            "GameData/Foo/c.cfg"
        );
        Ok(())
    }
}
