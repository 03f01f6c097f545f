use crate::prelude::*;

pub(super) fn plugin(app: &mut App) {
    app.init_resource::<DidFixedTimestepRunThisFrame>()
        // Cleared at the start of every frame, set by every fixed step.
        .add_systems(PreUpdate, clear_fixed_timestep_flag)
        .add_systems(FixedPreUpdate, set_fixed_timestep_flag);
}

/// Whether at least one fixed step ran this frame. Accumulated input is only
/// cleared when it did, so presses between fixed steps reach the controller.
#[derive(Resource, Debug, Deref, DerefMut, Default)]
pub(crate) struct DidFixedTimestepRunThisFrame(bool);

fn clear_fixed_timestep_flag(mut did_run: ResMut<DidFixedTimestepRunThisFrame>) {
    **did_run = false;
}

fn set_fixed_timestep_flag(mut did_run: ResMut<DidFixedTimestepRunThisFrame>) {
    **did_run = true;
}

pub(crate) fn did_fixed_timestep_run_this_frame(did_run: Res<DidFixedTimestepRunThisFrame>) -> bool {
    **did_run
}
