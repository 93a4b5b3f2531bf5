//! Extraction of primitives from the current point selection.
use crate::algebra::intersect_selection;
use crate::cluster::{MulticastPipe, Replica};
use crate::error::ClusterError;
use crate::fit::{fit, FitKind};
use crate::primitive::{Primitive, PrimitiveList};
use crate::reader::PagedOctree;
use crate::report::{user_error, EXTRACT_PRIMITIVE, INTERSECT_PRIMITIVES};
use glam::DVec3;

fn report(operation: &str, e: ClusterError) -> String {
    match e {
        ClusterError::RemoteFailure(message) => user_error(operation, message),
        other => user_error(operation, other),
    }
}

/// Fit a primitive of `kind` to the selected points and add it to `list`.
///
/// The head replica gathers the points and fits; followers receive the result.
pub fn extract_primitive<P: MulticastPipe>(
    tree: &mut PagedOctree,
    kind: FitKind,
    list: &mut PrimitiveList,
    replica: &mut Replica<P>,
) -> Result<usize, String> {
    let primitive = replica
        .share_primitive(|| {
            let mut points: Vec<DVec3> = Vec::new();
            tree.process_selected_points(|p| points.push(p.position_f64()))
                .map_err(|e| e.to_string())?;
            fit(kind, points).map_err(|e| e.to_string())
        })
        .map_err(|e| report(EXTRACT_PRIMITIVE, e))?;
    Ok(list.add(primitive))
}

/// Intersect the selected primitives of `list` and add the result.
pub fn intersect_selected<P: MulticastPipe>(list: &mut PrimitiveList, replica: &mut Replica<P>) -> Result<usize, String> {
    let selection: Vec<Primitive> = list.selected().cloned().collect();
    let primitive = replica
        .share_primitive(|| {
            let refs: Vec<&Primitive> = selection.iter().collect();
            intersect_selection(&refs).map_err(|e| e.to_string())
        })
        .map_err(|e| report(INTERSECT_PRIMITIVES, e))?;
    Ok(list.add(primitive))
}
