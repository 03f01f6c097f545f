use avian3d::prelude::*;
use bevy::prelude::*;
use bevy_enhanced_input::prelude::*;
use bevy_ledge::prelude::*;

fn main() -> AppExit {
    App::new()
        .add_plugins((
            DefaultPlugins,
            PhysicsPlugins::default(),
            EnhancedInputPlugin,
            LedgePlugin::default(),
        ))
        .add_input_context::<PlayerInput>()
        .add_systems(Startup, setup)
        .add_systems(Update, (log_actions, follow_player))
        .run()
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Spawn the player. The character moves along Z and jumps along Y.
    commands.spawn((
        CharacterController::default(),
        Collider::capsule(0.5, 1.0),
        Transform::from_xyz(0.0, 4.0, 0.0),
        Mesh3d(meshes.add(Capsule3d::new(0.5, 1.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.9, 0.5, 0.2))),
        PlayerInput,
        actions!(PlayerInput[
            (
                Action::<Movement>::new(),
                DeadZone::default(),
                Bindings::spawn((
                    Cardinal::wasd_keys(),
                    Axial::left_stick(),
                )),
            ),
            (
                Action::<Jump>::new(),
                bindings![KeyCode::Space, GamepadButton::South],
            ),
            (
                Action::<Sprint>::new(),
                bindings![KeyCode::ShiftLeft, GamepadButton::LeftThumb],
            ),
            (
                Action::<Dash>::new(),
                bindings![KeyCode::KeyE, GamepadButton::RightTrigger],
            ),
            (
                Action::<GroundSlide>::new(),
                bindings![KeyCode::ControlLeft, GamepadButton::East],
            ),
            (
                Action::<FallAttack>::new(),
                bindings![KeyCode::KeyF, GamepadButton::West],
            ),
        ]),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(12.0, 4.0, 0.0).looking_at(vec3(0.0, 2.0, 0.0), Vec3::Y),
    ));
    commands.spawn((
        Transform::from_xyz(0.0, 1.0, 0.0).looking_at(vec3(1.0, -2.0, -2.0), Vec3::Y),
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
    ));

    // Floor, a wall to slide down and a low ceiling to slide under.
    let material = materials.add(Color::srgb(0.6, 0.6, 0.65));
    for (size, position) in [
        (vec3(4.0, 1.0, 60.0), vec3(0.0, -0.5, 0.0)),
        (vec3(4.0, 12.0, 1.0), vec3(0.0, 6.0, 12.0)),
        (vec3(4.0, 1.0, 4.0), vec3(0.0, 2.0, -8.0)),
    ] {
        commands.spawn((
            RigidBody::Static,
            Collider::cuboid(size.x, size.y, size.z),
            Mesh3d(meshes.add(Cuboid::from_size(size))),
            MeshMaterial3d(material.clone()),
            Transform::from_translation(position),
        ));
    }
}

#[derive(Component, Default)]
struct PlayerInput;

fn log_actions(mut actions: MessageReader<CharacterAction>) {
    for action in actions.read() {
        info!("{:?}", action.action);
    }
}

fn follow_player(
    player: Single<&Transform, (With<CharacterController>, Without<Camera3d>)>,
    mut camera: Single<&mut Transform, With<Camera3d>>,
) {
    let target = player.translation + Vec3::Y;
    camera.translation = target + vec3(12.0, 3.0, 0.0);
    camera.look_at(target, Vec3::Y);
}
