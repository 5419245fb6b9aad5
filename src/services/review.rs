//! Reviewer edits over a run's face and cluster indices.
//!
//! Every operation is idempotent against unknown identifiers: accepting a
//! face that does not exist, merging a cluster that was already merged
//! away, or splitting with stale face ids all degrade to no-ops so clients
//! can retry freely. Photos are never touched here.

use uuid::Uuid;

use crate::models::{ClusterId, FaceRecord, RunContext};

/// Set the acceptance flag of each given face to accepted.
pub fn accept_faces(ctx: &mut RunContext, face_ids: &[Uuid]) {
    set_face_acceptance(ctx, face_ids, true);
}

/// Set the acceptance flag of each given face to rejected.
pub fn reject_faces(ctx: &mut RunContext, face_ids: &[Uuid]) {
    set_face_acceptance(ctx, face_ids, false);
}

fn set_face_acceptance(ctx: &mut RunContext, face_ids: &[Uuid], accepted: bool) {
    for face_id in face_ids {
        if let Some(face) = ctx.faces.get_mut(face_id) {
            face.accepted = Some(accepted);
        }
    }
}

/// Accept every member face of each given cluster.
pub fn accept_clusters(ctx: &mut RunContext, cluster_ids: &[ClusterId]) {
    set_cluster_acceptance(ctx, cluster_ids, true);
}

/// Reject every member face of each given cluster.
pub fn reject_clusters(ctx: &mut RunContext, cluster_ids: &[ClusterId]) {
    set_cluster_acceptance(ctx, cluster_ids, false);
}

fn set_cluster_acceptance(ctx: &mut RunContext, cluster_ids: &[ClusterId], accepted: bool) {
    for cluster_id in cluster_ids {
        let Some(member_ids) = ctx.clusters.get(cluster_id) else {
            continue;
        };
        for face_id in member_ids.clone() {
            if let Some(face) = ctx.faces.get_mut(&face_id) {
                face.accepted = Some(accepted);
            }
        }
    }
}

/// Merge clusters: the first id is the target, every following source is
/// folded into it one at a time. Fewer than two ids is a no-op; a missing
/// source is a no-op; a missing target is created. The noise cluster is
/// never merged, in either direction.
pub fn merge_clusters(ctx: &mut RunContext, cluster_ids: &[ClusterId]) {
    let Some((target, sources)) = cluster_ids.split_first() else {
        return;
    };
    if sources.is_empty() || target.is_noise() {
        return;
    }
    for source in sources {
        merge_into(ctx, target, source);
    }
}

fn merge_into(ctx: &mut RunContext, target: &ClusterId, source: &ClusterId) {
    if source.is_noise() || source == target {
        return;
    }
    let Some(source_members) = ctx.clusters.remove(source) else {
        return;
    };

    for face_id in &source_members {
        if let Some(face) = ctx.faces.get_mut(face_id) {
            face.cluster_id = target.clone();
        }
    }

    let target_members = ctx.clusters.entry(target.clone()).or_default();
    target_members.extend(source_members);

    // De-duplicate while preserving first-occurrence order.
    let mut seen = std::collections::HashSet::new();
    target_members.retain(|face_id| seen.insert(*face_id));
}

/// Split the named faces out of a cluster into a derived cluster.
///
/// The derived id starts at `{source}_split`; if that id is already taken
/// (a repeated split of the same source), a counter suffix disambiguates so
/// each split creates a distinct group. Faces that are not members of the
/// source are ignored; an empty face set or unknown source is a no-op.
pub fn split_cluster(ctx: &mut RunContext, source: &ClusterId, face_ids: &[Uuid]) {
    if face_ids.is_empty() || source.is_noise() {
        return;
    }
    let Some(members) = ctx.clusters.get(source).cloned() else {
        return;
    };

    let new_id = derive_split_id(ctx, source);
    let mut extracted = Vec::new();
    let mut remaining = Vec::new();
    for face_id in members {
        if face_ids.contains(&face_id) {
            extracted.push(face_id);
        } else {
            remaining.push(face_id);
        }
    }
    if extracted.is_empty() {
        return;
    }

    for face_id in &extracted {
        if let Some(face) = ctx.faces.get_mut(face_id) {
            face.cluster_id = new_id.clone();
        }
    }
    ctx.clusters.insert(source.clone(), remaining);
    ctx.clusters.insert(new_id, extracted);
}

fn derive_split_id(ctx: &RunContext, source: &ClusterId) -> ClusterId {
    let base = format!("{source}_split");
    let mut candidate = ClusterId::Label(base.clone());
    let mut suffix = 2;
    while ctx.clusters.contains_key(&candidate) {
        candidate = ClusterId::Label(format!("{base}_{suffix}"));
        suffix += 1;
    }
    candidate
}

/// All faces in insertion order, cloned for the response so the caller can
/// observe the net effect of a mutation batch.
pub fn face_collection(ctx: &RunContext) -> Vec<FaceRecord> {
    ctx.faces_in_order().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunParameters;
    use crate::services::bucket::BucketGranularity;
    use std::path::PathBuf;

    fn context_with_faces(count: usize) -> (RunContext, Vec<Uuid>) {
        let mut ctx = RunContext::new(
            Uuid::new_v4(),
            RunParameters {
                folder: PathBuf::from("/tmp/photos"),
                bucket: BucketGranularity::Month,
                max_edge: 1600,
                min_face_px: 48,
                thumb_edge: 256,
                downscale_detector: true,
            },
        );
        let mut ids = Vec::new();
        for _ in 0..count {
            let face_id = Uuid::new_v4();
            ctx.insert_face(FaceRecord {
                face_id,
                photo_id: Uuid::new_v4(),
                bucket_key: "2024-03".to_string(),
                bbox: (0, 0, 48, 48),
                score: 0.9,
                size_px: 48,
                embedding_id: Uuid::new_v4(),
                embedding: vec![1.0, 0.0, 0.0],
                cluster_id: ClusterId::Unassigned,
                accepted: None,
                thumb_path: PathBuf::from("/tmp/face.jpg"),
            });
            ids.push(face_id);
        }
        (ctx, ids)
    }

    fn assign(ctx: &mut RunContext, cluster: &str, face_ids: &[Uuid]) {
        let id = ClusterId::from(cluster);
        for face_id in face_ids {
            if let Some(face) = ctx.faces.get_mut(face_id) {
                face.cluster_id = id.clone();
            }
        }
        ctx.clusters.insert(id, face_ids.to_vec());
    }

    #[test]
    fn accept_and_reject_set_the_flag() {
        let (mut ctx, ids) = context_with_faces(2);
        accept_faces(&mut ctx, &[ids[0]]);
        reject_faces(&mut ctx, &[ids[1]]);
        assert_eq!(ctx.faces[&ids[0]].accepted, Some(true));
        assert_eq!(ctx.faces[&ids[1]].accepted, Some(false));
    }

    #[test]
    fn unknown_face_ids_are_silently_ignored() {
        let (mut ctx, ids) = context_with_faces(1);
        accept_faces(&mut ctx, &[Uuid::new_v4()]);
        reject_clusters(&mut ctx, &[ClusterId::Label("cluster_404".into())]);
        assert_eq!(ctx.faces[&ids[0]].accepted, None);
    }

    #[test]
    fn cluster_acceptance_covers_every_member() {
        let (mut ctx, ids) = context_with_faces(3);
        assign(&mut ctx, "cluster_001", &ids[..2]);
        assign(&mut ctx, "cluster_002", &ids[2..]);
        accept_clusters(&mut ctx, &[ClusterId::Label("cluster_001".into())]);
        assert_eq!(ctx.faces[&ids[0]].accepted, Some(true));
        assert_eq!(ctx.faces[&ids[1]].accepted, Some(true));
        assert_eq!(ctx.faces[&ids[2]].accepted, None);
    }

    #[test]
    fn merge_moves_members_and_removes_source() {
        let (mut ctx, ids) = context_with_faces(3);
        assign(&mut ctx, "cluster_001", &ids[..1]);
        assign(&mut ctx, "cluster_002", &ids[1..]);
        let a = ClusterId::Label("cluster_001".into());
        let b = ClusterId::Label("cluster_002".into());
        merge_clusters(&mut ctx, &[a.clone(), b.clone()]);

        assert!(!ctx.clusters.contains_key(&b));
        assert_eq!(ctx.clusters[&a], vec![ids[0], ids[1], ids[2]]);
        for id in &ids {
            assert_eq!(ctx.faces[id].cluster_id, a);
        }
    }

    #[test]
    fn merge_is_associative_in_outcome() {
        let (mut one_shot, ids) = context_with_faces(6);
        assign(&mut one_shot, "a", &ids[..2]);
        assign(&mut one_shot, "b", &ids[2..4]);
        assign(&mut one_shot, "c", &ids[4..]);
        let mut stepwise = one_shot.clone();

        let a = ClusterId::Label("a".into());
        let b = ClusterId::Label("b".into());
        let c = ClusterId::Label("c".into());
        merge_clusters(&mut one_shot, &[a.clone(), b.clone(), c.clone()]);
        merge_clusters(&mut stepwise, &[a.clone(), b.clone()]);
        merge_clusters(&mut stepwise, &[a.clone(), c.clone()]);

        assert_eq!(one_shot.clusters[&a], stepwise.clusters[&a]);
    }

    #[test]
    fn merge_deduplicates_shared_members() {
        let (mut ctx, ids) = context_with_faces(2);
        // Erroneous shared membership across both lists.
        assign(&mut ctx, "a", &[ids[0], ids[1]]);
        ctx.clusters
            .insert(ClusterId::Label("b".into()), vec![ids[1]]);
        merge_clusters(
            &mut ctx,
            &[ClusterId::Label("a".into()), ClusterId::Label("b".into())],
        );
        let members = &ctx.clusters[&ClusterId::Label("a".into())];
        assert_eq!(members.iter().filter(|id| **id == ids[1]).count(), 1);
    }

    #[test]
    fn merge_into_missing_target_creates_it() {
        let (mut ctx, ids) = context_with_faces(2);
        assign(&mut ctx, "b", &ids);
        let target = ClusterId::Label("person_42".into());
        merge_clusters(&mut ctx, &[target.clone(), ClusterId::Label("b".into())]);
        assert_eq!(ctx.clusters[&target], ids);
    }

    #[test]
    fn merge_short_list_or_noise_is_a_noop() {
        let (mut ctx, ids) = context_with_faces(2);
        assign(&mut ctx, "a", &ids[..1]);
        assign(&mut ctx, "noise", &ids[1..]);
        let before = ctx.clusters.clone();

        merge_clusters(&mut ctx, &[ClusterId::Label("a".into())]);
        merge_clusters(&mut ctx, &[ClusterId::Label("a".into()), ClusterId::Noise]);
        merge_clusters(&mut ctx, &[ClusterId::Noise, ClusterId::Label("a".into())]);
        assert_eq!(ctx.clusters, before);
    }

    #[test]
    fn split_partitions_the_source() {
        let (mut ctx, ids) = context_with_faces(4);
        assign(&mut ctx, "cluster_001", &ids);
        let source = ClusterId::Label("cluster_001".into());
        split_cluster(&mut ctx, &source, &ids[..2]);

        let derived = ClusterId::Label("cluster_001_split".into());
        let kept = &ctx.clusters[&source];
        let moved = &ctx.clusters[&derived];
        assert_eq!(moved, &ids[..2].to_vec());
        assert_eq!(kept, &ids[2..].to_vec());
        assert!(moved.iter().all(|id| !kept.contains(id)));
        assert_eq!(ctx.faces[&ids[0]].cluster_id, derived);
        assert_eq!(ctx.faces[&ids[3]].cluster_id, source);
    }

    #[test]
    fn repeated_splits_get_distinct_ids() {
        let (mut ctx, ids) = context_with_faces(3);
        assign(&mut ctx, "cluster_001", &ids);
        let source = ClusterId::Label("cluster_001".into());
        split_cluster(&mut ctx, &source, &ids[..1]);
        split_cluster(&mut ctx, &source, &ids[1..2]);

        assert!(ctx
            .clusters
            .contains_key(&ClusterId::Label("cluster_001_split".into())));
        assert!(ctx
            .clusters
            .contains_key(&ClusterId::Label("cluster_001_split_2".into())));
        assert_eq!(ctx.clusters[&source], vec![ids[2]]);
    }

    #[test]
    fn split_with_unknown_source_or_empty_set_is_a_noop() {
        let (mut ctx, ids) = context_with_faces(2);
        assign(&mut ctx, "cluster_001", &ids);
        let before = ctx.clusters.clone();
        split_cluster(&mut ctx, &ClusterId::Label("cluster_404".into()), &ids);
        split_cluster(&mut ctx, &ClusterId::Label("cluster_001".into()), &[]);
        split_cluster(
            &mut ctx,
            &ClusterId::Label("cluster_001".into()),
            &[Uuid::new_v4()],
        );
        assert_eq!(ctx.clusters, before);
    }
}
