use nalgebra as na;

const MIN_DISTANCE: f32 = 0.1;
const MAX_DISTANCE: f32 = 1000.0;
const ORBIT_SENSITIVITY: f32 = 0.005;
const PAN_SENSITIVITY: f32 = 0.01;

/// Camera mutations as they arrive from input handling. Every one of them
/// restarts accumulation; the invalidation coordinator owns that decision.
#[derive(Clone, Copy, Debug)]
pub enum CameraEdit {
    Orbit { dx: f32, dy: f32 },
    Pan { dx: f32, dy: f32 },
    Zoom { delta: f32 },
    Dolly { offset: [f32; 3] },
    LookAt { position: [f32; 3], target: [f32; 3], up: [f32; 3] },
    Fov { fov_y: f32 },
}

/// Interactive look-at camera with an orbit rig around its target.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    position: na::Point3<f32>,
    target: na::Point3<f32>,
    up: na::Vector3<f32>,
    fov_y: f32,
    distance: f32,
    yaw: f32,
    pitch: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Camera::look_at(
            na::Point3::new(0.0, 1.0, 5.0),
            na::Point3::origin(),
            na::Vector3::y(),
            std::f32::consts::FRAC_PI_4,
        )
    }
}

impl Camera {
    pub fn look_at(
        position: na::Point3<f32>,
        target: na::Point3<f32>,
        up: na::Vector3<f32>,
        fov_y: f32,
    ) -> Self {
        let offset = position - target;
        let distance = offset.norm().max(MIN_DISTANCE);
        Camera {
            position,
            target,
            up,
            fov_y,
            distance,
            yaw: offset.x.atan2(offset.z),
            pitch: (offset.y / distance).max(-1.0).min(1.0).asin(),
        }
    }

    pub fn position(&self) -> na::Point3<f32> {
        self.position
    }

    pub fn target(&self) -> na::Point3<f32> {
        self.target
    }

    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    pub fn view(&self) -> na::Matrix4<f32> {
        na::Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    /// World-space ray generation basis: `(origin, forward, right, up)`.
    pub fn basis(
        &self,
    ) -> (
        na::Point3<f32>,
        na::Vector3<f32>,
        na::Vector3<f32>,
        na::Vector3<f32>,
    ) {
        let forward = (self.target - self.position).normalize();
        let right = forward.cross(&self.up).normalize();
        let up = right.cross(&forward);
        (self.position, forward, right, up)
    }

    pub fn apply(&mut self, edit: CameraEdit) {
        match edit {
            CameraEdit::Orbit { dx, dy } => self.orbit(dx, dy),
            CameraEdit::Pan { dx, dy } => self.pan(dx, dy),
            CameraEdit::Zoom { delta } => self.zoom(delta),
            CameraEdit::Dolly { offset } => self.dolly(na::Vector3::from(offset)),
            CameraEdit::LookAt { position, target, up } => {
                *self = Camera::look_at(
                    na::Point3::from(na::Vector3::from(position)),
                    na::Point3::from(na::Vector3::from(target)),
                    na::Vector3::from(up),
                    self.fov_y,
                );
            }
            CameraEdit::Fov { fov_y } => self.set_fov_y(fov_y),
        }
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        // Clamp pitch short of the poles to avoid gimbal lock.
        let limit = std::f32::consts::FRAC_PI_2 - 0.1;
        self.yaw -= dx * ORBIT_SENSITIVITY;
        self.pitch = (self.pitch - dy * ORBIT_SENSITIVITY).max(-limit).min(limit);
        self.place_on_orbit();
    }

    pub fn pan(&mut self, dx: f32, dy: f32) {
        let (_, _, right, up) = self.basis();
        let pan = right * (-dx * PAN_SENSITIVITY) + up * (dy * PAN_SENSITIVITY);
        self.position += pan;
        self.target += pan;
    }

    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance * (1.0 - delta * 0.05))
            .max(MIN_DISTANCE)
            .min(MAX_DISTANCE);
        self.place_on_orbit();
    }

    /// Translate position and target together; `offset` is in view space,
    /// x right, y up, z forward.
    pub fn dolly(&mut self, offset: na::Vector3<f32>) {
        let (_, forward, right, up) = self.basis();
        let world = right * offset.x + up * offset.y + forward * offset.z;
        self.position += world;
        self.target += world;
    }

    pub fn set_fov_y(&mut self, fov_y: f32) {
        self.fov_y = fov_y.max(0.01).min(std::f32::consts::PI - 0.01);
    }

    fn place_on_orbit(&mut self) {
        let offset = na::Vector3::new(
            self.distance * self.pitch.cos() * self.yaw.sin(),
            self.distance * self.pitch.sin(),
            self.distance * self.pitch.cos() * self.yaw.cos(),
        );
        self.position = self.target + offset;
    }
}
