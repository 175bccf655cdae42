use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

/// Runtime description of a viewer scene: one figure, a camera and up to
/// two shadow-casting lights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
}

impl Scene {
    /// Parses the scene XML produced by the authoring tools.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let mut objects = Vec::new();

        for node in document.descendants().filter(|n| n.has_tag_name("object")) {
            let mut object = SceneObject::default();
            object.name = required_text(&node, "name")?;
            object.object_type =
                optional_text(&node, "type").unwrap_or_else(|| "figure".to_string());
            object.position = parse_vec3(optional_text(&node, "position"), object.position)?;
            object.rotation = parse_vec3(optional_text(&node, "rotation"), object.rotation)?;
            object.scale = parse_vec3(optional_text(&node, "scale"), object.scale)?;
            object.target = parse_vec3(optional_text(&node, "target"), object.target)?;
            object.color = parse_color(optional_text(&node, "color"), object.color)?;
            object.fov = parse_f32(optional_text(&node, "fov"), object.fov)?;
            object.intensity = parse_f32(optional_text(&node, "intensity"), object.intensity)?;
            object.extent = parse_f32(optional_text(&node, "extent"), object.extent)?;
            object.near = parse_f32(optional_text(&node, "near"), object.near)?;
            object.far = parse_f32(optional_text(&node, "far"), object.far)?;
            object.resolution = parse_u32(optional_text(&node, "resolution"), object.resolution)?;
            objects.push(object);
        }

        Ok(Self { objects })
    }

    pub fn camera(&self) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.object_type == "camera")
    }

    /// The figure the viewer poses and draws.
    pub fn figure(&self) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.object_type == "figure")
    }

    /// Lights in authoring order: the first is the primary shadow caster,
    /// the second the secondary. Further lights are ignored by this core.
    pub fn lights(&self) -> Vec<&SceneObject> {
        self.objects
            .iter()
            .filter(|o| o.object_type == "light")
            .collect()
    }
}

/// Scene object as described by the authoring tools. `extent`, `near`,
/// `far` and `resolution` only matter for lights, where they shape the
/// orthographic shadow projection and its depth target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub target: Vec3,
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_extent")]
    pub extent: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    #[serde(default = "default_resolution")]
    pub resolution: u32,
}

impl SceneObject {
    /// World transform of the object's node: scale, then rotation around
    /// X/Y/Z, then translation.
    pub fn world_transform(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let rotation = Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());
        let scale = Mat4::from_scale(self.scale);
        translation * rotation * scale
    }
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            object_type: String::new(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            target: Vec3::ZERO,
            color: default_color(),
            fov: default_fov(),
            intensity: default_intensity(),
            extent: default_extent(),
            near: default_near(),
            far: default_far(),
            resolution: default_resolution(),
        }
    }
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_fov() -> f32 {
    45.0
}

fn default_intensity() -> f32 {
    1.0
}

fn default_extent() -> f32 {
    12.0
}

fn default_near() -> f32 {
    1.0
}

fn default_far() -> f32 {
    20.0
}

fn default_resolution() -> u32 {
    1024
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let x = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let y = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    let z = numbers
        .next()
        .ok_or_else(|| anyhow!("vector is missing components"))?;
    Ok(Vec3::new(x, y, z))
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let r = numbers
        .next()
        .ok_or_else(|| anyhow!("color is missing components"))?;
    let g = numbers
        .next()
        .ok_or_else(|| anyhow!("color is missing components"))?;
    let b = numbers
        .next()
        .ok_or_else(|| anyhow!("color is missing components"))?;
    Ok(Vec3::new(r / 255.0, g / 255.0, b / 255.0))
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

fn parse_u32(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(value) => value
            .parse::<u32>()
            .map_err(|err| anyhow!("failed to parse integer: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene>
        <object>
            <name>Camera</name>
            <type>camera</type>
            <position>0 2 6</position>
            <fov>60</fov>
        </object>
        <object>
            <name>Sun</name>
            <type>light</type>
            <position>-10 12 0</position>
            <target>0 12 0</target>
            <extent>12</extent>
        </object>
        <object>
            <name>Fill</name>
            <type>light</type>
            <position>6 8 4</position>
            <extent>6</extent>
            <resolution>512</resolution>
        </object>
        <object>
            <name>Dancer</name>
            <type>figure</type>
            <scale>1 1 1</scale>
        </object>
    </scene>
    "#;

    #[test]
    fn parse_scene_finds_camera_lights_and_figure() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.objects.len(), 4);
        assert_eq!(scene.camera().unwrap().fov, 60.0);
        assert_eq!(scene.figure().unwrap().name, "Dancer");

        let lights = scene.lights();
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].name, "Sun");
        assert_eq!(lights[0].target, Vec3::new(0.0, 12.0, 0.0));
        assert_eq!(lights[0].resolution, 1024);
        // the secondary light keeps independent parameters
        assert_eq!(lights[1].extent, 6.0);
        assert_eq!(lights[1].resolution, 512);
    }

    #[test]
    fn missing_name_is_an_error() {
        let bad = "<scene><object><type>figure</type></object></scene>";
        assert!(Scene::from_xml(bad).is_err());
    }

    #[test]
    fn world_transform_applies_scale_rotation_translation() {
        let object = SceneObject {
            position: Vec3::new(1.0, 0.0, 0.0),
            rotation: Vec3::new(0.0, 90.0, 0.0),
            scale: Vec3::splat(2.0),
            ..SceneObject::default()
        };
        let transformed = object.world_transform().transform_point3(Vec3::X);
        assert!((transformed - Vec3::new(1.0, 0.0, -2.0)).length() < 1e-5);
    }
}
