//! The relationship resolver.
//!
//! Given a set of requested releases and the current installed state, the
//! resolver explores the tree of provider choices and produces either a
//! self-consistent installation plan or a structured explanation of why
//! none exists. Resolution never blocks on I/O; everything it needs comes
//! from the [`RegistryView`] snapshot.

use super::cache::{CacheEntry, RelationshipCache};
use super::options::ResolverOptions;
use super::resolved::{ProviderResolution, ResolvedRelationship, SelectionReason};
use crate::registry::{Candidate, RegistryView};
use crate::relationship::{RelationshipDescriptor, RelationshipMatch};
use crate::release::{Release, ReleaseKind};
use crate::sanity;
use crate::version::GameVersionCriteria;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// One discovered conflict.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    /// The release whose `conflicts` clause fired.
    pub source: Arc<Release>,
    pub descriptor: RelationshipDescriptor,
    /// What the clause matched.
    pub with: RelationshipMatch,
}

/// Fatal resolution failures (unless `proceed_with_inconsistencies`).
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("cannot install: {} unresolved dependency path(s)", .traces.len())]
    UnmetDependencies {
        traces: Vec<Vec<ResolvedRelationship>>,
    },

    #[error("cannot install: {} conflict(s)", .pairs.len())]
    Conflicts { pairs: Vec<ConflictRecord> },
}

/// Optional-expansion gates carried through the recursion.
///
/// Recommendations of recommendations are never followed; suggestions
/// reached through an optional expansion survive only under
/// `with_all_suggests`.
#[derive(Debug, Clone, Copy)]
struct ExpandFlags {
    recommends: bool,
    suggests: bool,
}

/// Undo point for a provider or optional-expansion attempt.
struct Snapshot {
    chosen: HashMap<String, Arc<Release>>,
    order_len: usize,
    conflicts_len: usize,
}

/// Recursive provider-expansion resolver. Build one per `resolve()` call;
/// the accumulated state is the output.
pub struct RelationshipResolver<'a> {
    view: &'a RegistryView<'a>,
    criteria: GameVersionCriteria,
    options: ResolverOptions,

    installed: HashMap<String, Arc<Release>>,
    chosen: HashMap<String, Arc<Release>>,
    chosen_order: Vec<String>,
    /// Releases whose dependencies are being resolved right now. A
    /// descriptor matching one of these is tentatively satisfied by it;
    /// if the attempt fails the whole branch is abandoned.
    considering: HashMap<String, Arc<Release>>,

    resolved: Vec<ResolvedRelationship>,
    conflicts: Vec<ConflictRecord>,
    recommendations: BTreeMap<String, (bool, BTreeSet<String>)>,
    suggestions: BTreeMap<String, BTreeSet<String>>,
    supporters: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(
        view: &'a RegistryView<'a>,
        criteria: GameVersionCriteria,
        options: ResolverOptions,
    ) -> Self {
        RelationshipResolver {
            view,
            criteria,
            options,
            installed: HashMap::new(),
            chosen: HashMap::new(),
            chosen_order: Vec::new(),
            considering: HashMap::new(),
            resolved: Vec::new(),
            conflicts: Vec::new(),
            recommendations: BTreeMap::new(),
            suggestions: BTreeMap::new(),
            supporters: BTreeMap::new(),
        }
    }

    /// Resolve the user's requests against the registry.
    ///
    /// `removals` mask installed releases, so a request can replace
    /// something currently installed without tripping over it.
    pub fn resolve(
        &mut self,
        requests: &[Arc<Release>],
        removals: &[Arc<Release>],
    ) -> Result<(), ResolverError> {
        let removed: HashSet<&str> = removals.iter().map(|r| r.identifier.as_str()).collect();
        self.installed = self
            .view
            .installed_releases()
            .filter(|release| !removed.contains(release.identifier.as_str()))
            .map(|release| (release.identifier.clone(), Arc::clone(release)))
            .collect();

        let flags = ExpandFlags {
            recommends: self.options.with_recommends && !self.options.get_recommenders,
            suggests: self.options.with_suggests && !self.options.get_recommenders,
        };

        let mut cache = RelationshipCache::default();
        for request in requests {
            let (target, reason) = match self.replacement_for(request) {
                Some(replacement) => {
                    debug!(
                        request = %request,
                        replacement = %replacement,
                        "following replaced_by"
                    );
                    (replacement, SelectionReason::Replacement(Arc::clone(request)))
                }
                None => (Arc::clone(request), SelectionReason::UserRequested),
            };
            let node = self.resolve_request(target, reason, &mut cache, flags);
            self.resolved.push(node);
        }

        if self.options.with_supports {
            self.collect_supporters();
        }

        if self.options.proceed_with_inconsistencies {
            return Ok(());
        }

        if !self.conflicts.is_empty() {
            return Err(ResolverError::Conflicts {
                pairs: self.conflicts.clone(),
            });
        }
        let traces = self.unsatisfied();
        if !traces.is_empty() {
            return Err(ResolverError::UnmetDependencies { traces });
        }
        self.final_consistency_gate()
    }

    /// The installation plan: chosen releases in topological order,
    /// dependency before dependent, ties broken by identifier.
    pub fn mod_list(&self) -> Vec<Arc<Release>> {
        let chosen: Vec<&Arc<Release>> = self
            .chosen_order
            .iter()
            .filter_map(|id| self.chosen.get(id))
            .collect();

        // dependency identifier -> dependents
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
        for release in &chosen {
            indegree.entry(release.identifier.as_str()).or_insert(0);
        }
        for dependent in &chosen {
            for descriptor in &dependent.depends {
                for dependency in &chosen {
                    if dependency.identifier != dependent.identifier
                        && descriptor.matches_release(dependency)
                    {
                        dependents
                            .entry(dependency.identifier.as_str())
                            .or_default()
                            .push(dependent.identifier.as_str());
                        *indegree.entry(dependent.identifier.as_str()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order: Vec<&str> = Vec::with_capacity(chosen.len());
        while let Some(next) = ready.iter().next().copied() {
            ready.remove(next);
            order.push(next);
            for dependent in dependents.get(next).cloned().unwrap_or_default() {
                let degree = indegree.get_mut(dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(dependent);
                }
            }
        }
        // Cycles (mutual provides) drop out of the sort; append what is
        // left in identifier order so the plan stays complete and stable.
        for (id, degree) in &indegree {
            if *degree > 0 && !order.contains(id) {
                order.push(*id);
            }
        }

        order
            .into_iter()
            .filter_map(|id| self.chosen.get(id))
            .map(Arc::clone)
            .collect()
    }

    /// Human-readable reason per release participating in a conflict.
    pub fn conflict_list(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for record in &self.conflicts {
            let target = match &record.with {
                RelationshipMatch::Release(other) => other.to_string(),
                RelationshipMatch::Dll(name) => format!("DLL {}", name),
                RelationshipMatch::Dlc(fact) => format!("DLC {}", fact.identifier),
            };
            map.insert(
                record.source.identifier.clone(),
                format!("{} conflicts with {}", record.source, target),
            );
            if let RelationshipMatch::Release(other) = &record.with {
                map.insert(
                    other.identifier.clone(),
                    format!("{} conflicts with {}", other, record.source),
                );
            }
        }
        map
    }

    /// Explanation traces for everything that could not be installed.
    pub fn unsatisfied(&self) -> Vec<Vec<ResolvedRelationship>> {
        self.resolved
            .iter()
            .flat_map(|node| node.unsatisfied_from(&[]))
            .collect()
    }

    /// Recorded conflicts, in discovery order.
    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    /// `recommended identifier → (default-check, recommending identifiers)`.
    pub fn recommendations(&self) -> &BTreeMap<String, (bool, BTreeSet<String>)> {
        &self.recommendations
    }

    /// `suggested identifier → suggesting identifiers`.
    pub fn suggestions(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.suggestions
    }

    /// `supporter identifier → chosen identifiers it supports`.
    pub fn supporters(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.supporters
    }

    // ------------------------------------------------------------------
    // Core recursion
    // ------------------------------------------------------------------

    fn resolve_request(
        &mut self,
        release: Arc<Release>,
        reason: SelectionReason,
        cache: &mut RelationshipCache,
        flags: ExpandFlags,
    ) -> ResolvedRelationship {
        let descriptor =
            RelationshipDescriptor::exact(release.identifier.clone(), release.version.clone());

        if let Some(installed) = self.installed.get(&release.identifier).cloned() {
            if descriptor.matches_release(&installed) {
                return ResolvedRelationship::ByInstalled {
                    source: None,
                    descriptor,
                    reason,
                    installed,
                };
            }
        }
        if let Some(chosen) = self.chosen.get(&release.identifier).cloned() {
            if descriptor.matches_release(&chosen) {
                return ResolvedRelationship::ByInstalling {
                    source: None,
                    descriptor,
                    reason,
                    chosen,
                };
            }
        }

        // The user picked this exact release; it is the only provider.
        let provider = self.try_provider(&descriptor, release, reason.clone(), cache, flags, false);
        ResolvedRelationship::ByNew {
            source: None,
            descriptor,
            reason,
            providers: vec![provider],
        }
    }

    fn resolve_descriptor(
        &mut self,
        source: Option<Arc<Release>>,
        descriptor: &RelationshipDescriptor,
        reason: SelectionReason,
        cache: &mut RelationshipCache,
        flags: ExpandFlags,
    ) -> ResolvedRelationship {
        if let Some(entry) = cache.get(descriptor).cloned() {
            match entry {
                CacheEntry::Done(node) => {
                    trace!(descriptor = %descriptor, "descriptor cache hit");
                    let reused = node.with_source(source, reason);
                    self.recommit(&reused);
                    return reused;
                }
                CacheEntry::InProgress(pending) => {
                    trace!(descriptor = %descriptor, pending = %pending, "cycle broken by pending choice");
                    return ResolvedRelationship::ByInstalling {
                        source,
                        descriptor: descriptor.clone(),
                        reason,
                        chosen: pending,
                    };
                }
            }
        }

        // Already satisfied by installed state?
        let mut installed: Vec<Arc<Release>> = self.installed.values().cloned().collect();
        installed.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        if let Some(RelationshipMatch::Release(found)) = descriptor.match_any(&installed, &[], &[])
        {
            let node = ResolvedRelationship::ByInstalled {
                source,
                descriptor: descriptor.clone(),
                reason,
                installed: found,
            };
            cache.finish(descriptor, node.clone());
            return node;
        }

        // By a release already chosen (or mid-resolution) in this run?
        let mut installing: Vec<Arc<Release>> = self
            .chosen
            .values()
            .chain(self.considering.values())
            .cloned()
            .collect();
        installing.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        if let Some(RelationshipMatch::Release(found)) = descriptor.match_any(&installing, &[], &[])
        {
            let node = ResolvedRelationship::ByInstalling {
                source,
                descriptor: descriptor.clone(),
                reason,
                chosen: found,
            };
            cache.finish(descriptor, node.clone());
            return node;
        }

        // Ambient DLL?
        if let Some(RelationshipMatch::Dll(dll)) =
            descriptor.match_any(&[], self.view.dlls(), &[])
        {
            let node = ResolvedRelationship::ByDll {
                source,
                descriptor: descriptor.clone(),
                reason,
                dll,
            };
            cache.finish(descriptor, node.clone());
            return node;
        }

        // Owned DLC counts as an unmanaged installed release.
        if let Some(RelationshipMatch::Dlc(fact)) = descriptor.match_any(&[], &[], self.view.dlc())
        {
            let node = ResolvedRelationship::ByInstalled {
                source,
                descriptor: descriptor.clone(),
                reason,
                installed: dlc_release(&fact),
            };
            cache.finish(descriptor, node.clone());
            return node;
        }

        // Something new has to be installed.
        let candidates = self.descriptor_candidates(descriptor);
        if candidates.is_empty() {
            debug!(descriptor = %descriptor, "no providers available");
            return ResolvedRelationship::ByNew {
                source,
                descriptor: descriptor.clone(),
                reason,
                providers: vec![],
            };
        }

        let isolate = candidates.len() > 1;
        let conflicts_before = self.conflicts.len();
        let mut providers = Vec::new();
        let mut satisfied = false;
        for candidate in candidates {
            let provider_reason = if candidate.exact {
                reason.clone()
            } else {
                match &source {
                    Some(parent) => SelectionReason::ProvidedBy(Arc::clone(parent)),
                    None => reason.clone(),
                }
            };
            let provider = self.try_provider(
                descriptor,
                candidate.release,
                provider_reason,
                cache,
                flags,
                isolate,
            );
            let ok = provider.satisfied;
            providers.push(provider);
            if ok {
                satisfied = true;
                break;
            }
        }

        // Conflicts recorded by rejected alternatives only matter if the
        // descriptor stays unsatisfied; a successful fallback absolves them.
        if satisfied && !self.options.proceed_with_inconsistencies {
            self.conflicts.truncate(conflicts_before);
        }

        let node = ResolvedRelationship::ByNew {
            source,
            descriptor: descriptor.clone(),
            reason,
            providers,
        };
        if satisfied {
            cache.finish(descriptor, node.clone());
        } else {
            cache.abandon(descriptor);
        }
        node
    }

    /// Attempt one provider for a descriptor. On failure the choice set is
    /// restored and the cache entry abandoned; discovered conflicts stay
    /// recorded so they can be reported.
    fn try_provider(
        &mut self,
        selected_by: &RelationshipDescriptor,
        candidate: Arc<Release>,
        reason: SelectionReason,
        cache: &mut RelationshipCache,
        flags: ExpandFlags,
        isolate_cache: bool,
    ) -> ProviderResolution {
        trace!(candidate = %candidate, isolate = isolate_cache, "attempting provider");
        cache.begin(selected_by, Arc::clone(&candidate));
        let snapshot = self.snapshot();

        let attempt = if isolate_cache {
            let mut branch = cache.clone();
            let result = self.resolve_release(&candidate, selected_by, reason, &mut branch, flags);
            if result.is_ok() {
                *cache = branch;
            }
            result
        } else {
            self.resolve_release(&candidate, selected_by, reason, cache, flags)
        };

        match attempt {
            Ok(resolutions) => ProviderResolution {
                provider: candidate,
                resolutions,
                satisfied: true,
            },
            Err(resolutions) => {
                debug!(candidate = %candidate, "provider rejected");
                self.restore_choices(snapshot);
                cache.abandon(selected_by);
                ProviderResolution {
                    provider: candidate,
                    resolutions,
                    satisfied: false,
                }
            }
        }
    }

    /// Resolve one release's dependencies and, on success, choose it.
    ///
    /// `Err` carries the resolutions gathered so far, including the
    /// unsatisfied node, for explanation traces.
    fn resolve_release(
        &mut self,
        candidate: &Arc<Release>,
        selected_by: &RelationshipDescriptor,
        reason: SelectionReason,
        cache: &mut RelationshipCache,
        flags: ExpandFlags,
    ) -> Result<Vec<ResolvedRelationship>, Vec<ResolvedRelationship>> {
        if let Some(existing) = self.chosen.get(&candidate.identifier) {
            if existing.version == candidate.version {
                return Ok(vec![]);
            }
            // A different version of the same module was already chosen.
            return Err(vec![]);
        }

        let found = self.find_conflicts(candidate);
        if !found.is_empty() {
            self.conflicts.extend(found);
            if !self.options.proceed_with_inconsistencies {
                return Err(vec![]);
            }
        }

        self.considering
            .insert(candidate.identifier.clone(), Arc::clone(candidate));

        let mut children = Vec::new();
        let mut failed = false;
        for dependency in &candidate.depends {
            let node = self.resolve_descriptor(
                Some(Arc::clone(candidate)),
                dependency,
                SelectionReason::Depends(Arc::clone(candidate)),
                cache,
                flags,
            );
            let ok = node.is_satisfied();
            children.push(node);
            if !ok && !self.options.proceed_with_inconsistencies {
                failed = true;
                break;
            }
        }

        self.considering.remove(&candidate.identifier);
        if failed {
            return Err(children);
        }

        self.chosen
            .insert(candidate.identifier.clone(), Arc::clone(candidate));
        self.chosen_order.push(candidate.identifier.clone());
        trace!(chosen = %candidate, reason = %reason, "release chosen");

        self.expand_optionals(candidate, selected_by, cache, flags, &mut children);
        Ok(children)
    }

    // ------------------------------------------------------------------
    // Optional relationships
    // ------------------------------------------------------------------

    fn expand_optionals(
        &mut self,
        release: &Arc<Release>,
        selected_by: &RelationshipDescriptor,
        cache: &mut RelationshipCache,
        flags: ExpandFlags,
        children: &mut Vec<ResolvedRelationship>,
    ) {
        if selected_by.suppress_recommendations() {
            return;
        }

        let recommends = release.recommends.clone();
        let suggests = release.suggests.clone();

        if self.options.with_recommends {
            for descriptor in &recommends {
                self.note_recommendation(descriptor, &release.identifier);
                if flags.recommends {
                    let kept = self.expand_optional(
                        release,
                        descriptor,
                        SelectionReason::Recommendation(Arc::clone(release)),
                        cache,
                        children,
                    );
                    if !kept {
                        if let Some(key) = self.optional_key(descriptor) {
                            if let Some(entry) = self.recommendations.get_mut(&key) {
                                entry.0 = false;
                            }
                        }
                    }
                }
            }
        }

        if self.options.with_suggests || self.options.with_all_suggests {
            for descriptor in &suggests {
                self.note_suggestion(descriptor, &release.identifier);
                if flags.suggests {
                    self.expand_optional(
                        release,
                        descriptor,
                        SelectionReason::Suggestion(Arc::clone(release)),
                        cache,
                        children,
                    );
                }
            }
        }
    }

    /// Soft-resolve an optional relationship. Failures and fresh conflicts
    /// roll back completely; the plan never breaks because of an optional.
    /// Returns whether the expansion was kept.
    fn expand_optional(
        &mut self,
        parent: &Arc<Release>,
        descriptor: &RelationshipDescriptor,
        reason: SelectionReason,
        cache: &mut RelationshipCache,
        children: &mut Vec<ResolvedRelationship>,
    ) -> bool {
        let child_flags = ExpandFlags {
            recommends: false,
            suggests: self.options.with_all_suggests,
        };

        let snapshot = self.snapshot();
        let mut branch = cache.clone();
        let node = self.resolve_descriptor(
            Some(Arc::clone(parent)),
            descriptor,
            reason,
            &mut branch,
            child_flags,
        );

        if node.is_satisfied() && self.conflicts.len() == snapshot.conflicts_len {
            *cache = branch;
            children.push(node);
            true
        } else {
            self.restore_all(snapshot);
            false
        }
    }

    fn optional_key(&self, descriptor: &RelationshipDescriptor) -> Option<String> {
        // Key the maps on the first alternative that is actually available.
        for identifier in descriptor.identifiers() {
            let available = !self
                .view
                .candidates_for(identifier, &self.criteria, self.options.stability_tolerance)
                .is_empty();
            if available {
                return Some(identifier.to_string());
            }
        }
        None
    }

    fn note_recommendation(&mut self, descriptor: &RelationshipDescriptor, source: &str) {
        if let Some(key) = self.optional_key(descriptor) {
            let entry = self
                .recommendations
                .entry(key)
                .or_insert_with(|| (true, BTreeSet::new()));
            entry.1.insert(source.to_string());
        }
    }

    fn note_suggestion(&mut self, descriptor: &RelationshipDescriptor, source: &str) {
        if let Some(key) = self.optional_key(descriptor) {
            self.suggestions
                .entry(key)
                .or_default()
                .insert(source.to_string());
        }
    }

    fn collect_supporters(&mut self) {
        for supporter in self.view.all_available() {
            for descriptor in &supporter.supports {
                for chosen in self.chosen.values() {
                    if descriptor.matches_release(chosen) {
                        self.supporters
                            .entry(supporter.identifier.clone())
                            .or_default()
                            .insert(chosen.identifier.clone());
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Support machinery
    // ------------------------------------------------------------------

    fn replacement_for(&self, request: &Arc<Release>) -> Option<Arc<Release>> {
        for descriptor in &request.replaced_by {
            let candidate = self
                .descriptor_candidates(descriptor)
                .into_iter()
                .next()
                .map(|c| c.release);
            if candidate.is_some() {
                return candidate;
            }
        }
        None
    }

    /// Installable candidates for a descriptor, in provider preference
    /// order. `any_of` alternatives contribute in metadata order. DLC-kind
    /// records are never installable by us.
    fn descriptor_candidates(&self, descriptor: &RelationshipDescriptor) -> Vec<Candidate> {
        match descriptor {
            RelationshipDescriptor::Single { identifier, .. } => self
                .view
                .candidates_for(identifier, &self.criteria, self.options.stability_tolerance)
                .into_iter()
                .filter(|candidate| descriptor.matches_release(&candidate.release))
                .filter(|candidate| candidate.release.kind != ReleaseKind::Dlc)
                .collect(),
            RelationshipDescriptor::AnyOf { alternatives, .. } => {
                let mut seen: HashSet<(String, String)> = HashSet::new();
                let mut out = Vec::new();
                for alternative in alternatives {
                    for candidate in self.descriptor_candidates(alternative) {
                        let key = (
                            candidate.release.identifier.clone(),
                            candidate.release.version.to_string(),
                        );
                        if seen.insert(key) {
                            out.push(candidate);
                        }
                    }
                }
                out
            }
        }
    }

    /// Conflicts between a candidate and the chosen + installed population,
    /// checked in both directions.
    fn find_conflicts(&self, candidate: &Arc<Release>) -> Vec<ConflictRecord> {
        let mut population: Vec<Arc<Release>> = self.chosen.values().cloned().collect();
        for (identifier, release) in &self.installed {
            if !self.chosen.contains_key(identifier) {
                population.push(Arc::clone(release));
            }
        }
        population.sort_by(|a, b| a.identifier.cmp(&b.identifier));

        let mut records = Vec::new();

        let others: Vec<Arc<Release>> = population
            .iter()
            .filter(|other| other.identifier != candidate.identifier)
            .cloned()
            .collect();
        for descriptor in &candidate.conflicts {
            if let Some(matched) =
                descriptor.match_any(&others, self.view.dlls(), self.view.dlc())
            {
                records.push(ConflictRecord {
                    source: Arc::clone(candidate),
                    descriptor: descriptor.clone(),
                    with: matched,
                });
            }
        }

        for other in &population {
            if other.identifier == candidate.identifier {
                continue;
            }
            for descriptor in &other.conflicts {
                if descriptor.matches_release(candidate) {
                    records.push(ConflictRecord {
                        source: Arc::clone(other),
                        descriptor: descriptor.clone(),
                        with: RelationshipMatch::Release(Arc::clone(candidate)),
                    });
                }
            }
        }

        records
    }

    /// Re-apply the choices a memoized resolution made, in case the branch
    /// that produced it was partially rolled back since.
    fn recommit(&mut self, node: &ResolvedRelationship) {
        match node {
            ResolvedRelationship::ByInstalling { chosen, .. } => {
                self.ensure_chosen(chosen);
            }
            ResolvedRelationship::ByNew { providers, .. } => {
                if let Some(winner) = providers.iter().find(|provider| provider.satisfied) {
                    self.ensure_chosen(&winner.provider);
                    for child in &winner.resolutions {
                        self.recommit(child);
                    }
                }
            }
            _ => {}
        }
    }

    fn ensure_chosen(&mut self, release: &Arc<Release>) {
        if self.chosen.contains_key(&release.identifier)
            || self.installed.contains_key(&release.identifier)
            || self.considering.contains_key(&release.identifier)
        {
            return;
        }
        self.chosen
            .insert(release.identifier.clone(), Arc::clone(release));
        self.chosen_order.push(release.identifier.clone());
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            chosen: self.chosen.clone(),
            order_len: self.chosen_order.len(),
            conflicts_len: self.conflicts.len(),
        }
    }

    fn restore_choices(&mut self, snapshot: Snapshot) {
        self.chosen = snapshot.chosen;
        self.chosen_order.truncate(snapshot.order_len);
    }

    fn restore_all(&mut self, snapshot: Snapshot) {
        self.conflicts.truncate(snapshot.conflicts_len);
        self.restore_choices(snapshot);
    }

    /// Last line of defense: the plan must pass the sanity checker against
    /// the combined chosen + installed population.
    fn final_consistency_gate(&self) -> Result<(), ResolverError> {
        let mut modules = self.mod_list();
        for (identifier, release) in &self.installed {
            if !self.chosen.contains_key(identifier) {
                modules.push(Arc::clone(release));
            }
        }
        let issues = sanity::check(&modules, self.view.dlls(), self.view.dlc());
        if !issues.conflicts.is_empty() {
            return Err(ResolverError::Conflicts {
                pairs: issues
                    .conflicts
                    .into_iter()
                    .map(|(source, descriptor, with)| ConflictRecord {
                        source,
                        descriptor,
                        with,
                    })
                    .collect(),
            });
        }
        if !issues.unmet.is_empty() {
            let traces = issues
                .unmet
                .into_iter()
                .map(|(release, descriptor)| {
                    vec![ResolvedRelationship::ByNew {
                        source: Some(Arc::clone(&release)),
                        descriptor,
                        reason: SelectionReason::Depends(release),
                        providers: vec![],
                    }]
                })
                .collect();
            return Err(ResolverError::UnmetDependencies { traces });
        }
        Ok(())
    }
}

/// Model an owned DLC as an unmanaged installed release.
fn dlc_release(fact: &crate::release::DlcFact) -> Arc<Release> {
    let mut release: Release = serde_json::from_value(serde_json::json!({
        "identifier": fact.identifier,
        "version": fact.version.to_string(),
        "kind": "dlc",
    }))
    .expect("synthetic dlc release is well-formed");
    release.name = Some(fact.identifier.clone());
    Arc::new(release)
}
