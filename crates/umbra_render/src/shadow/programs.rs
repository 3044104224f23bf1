//! Built-in shadow programs

use crate::device::ProgramDesc;
use crate::post::QUAD_VERTEX_SRC;

pub const DEPTH_PROGRAM_LABEL: &str = "umbra.shadow.depth";
pub const DISTANCE_PROGRAM_LABEL: &str = "umbra.shadow.distance";
pub const DEPTH_VIEW_PROGRAM_LABEL: &str = "umbra.shadow.depth_view";

const DEPTH_VERT_SRC: &str = r#"
#version 330 core
layout (location = 0) in vec3 aPos;

uniform mat4 u_model;
uniform mat4 u_lightMatrix;

void main() {
    gl_Position = u_lightMatrix * u_model * vec4(aPos, 1.0);
}
"#;

const DEPTH_FRAG_SRC: &str = r#"
#version 330 core

void main() {
}
"#;

const DISTANCE_VERT_SRC: &str = r#"
#version 330 core
layout (location = 0) in vec3 aPos;

uniform mat4 u_model;
uniform mat4 u_lightMatrix;

out vec3 v_worldPos;

void main() {
    vec4 world = u_model * vec4(aPos, 1.0);
    v_worldPos = world.xyz;
    gl_Position = u_lightMatrix * world;
}
"#;

// Point shadows compare linear distance, not projected depth
const DISTANCE_FRAG_SRC: &str = r#"
#version 330 core
in vec3 v_worldPos;

uniform vec3 u_lightPos;
uniform float u_farPlane;

void main() {
    gl_FragDepth = length(v_worldPos - u_lightPos) / u_farPlane;
}
"#;

const DEPTH_VIEW_FRAG_SRC: &str = r#"
#version 330 core
in vec2 v_texCoords;
out vec4 FragColor;

uniform sampler2D u_depthMap;

void main() {
    float d = texture(u_depthMap, v_texCoords).r;
    FragColor = vec4(vec3(d), 1.0);
}
"#;

pub(crate) const DEPTH_PROGRAM: ProgramDesc = ProgramDesc {
    label: DEPTH_PROGRAM_LABEL,
    vertex: DEPTH_VERT_SRC,
    fragment: DEPTH_FRAG_SRC,
};

pub(crate) const DISTANCE_PROGRAM: ProgramDesc = ProgramDesc {
    label: DISTANCE_PROGRAM_LABEL,
    vertex: DISTANCE_VERT_SRC,
    fragment: DISTANCE_FRAG_SRC,
};

pub(crate) const DEPTH_VIEW_PROGRAM: ProgramDesc = ProgramDesc {
    label: DEPTH_VIEW_PROGRAM_LABEL,
    vertex: QUAD_VERTEX_SRC,
    fragment: DEPTH_VIEW_FRAG_SRC,
};
