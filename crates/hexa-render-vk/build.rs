use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Instanced tiles:
    //   - binding 0, location 0: R32G32B32_SFLOAT (pos)
    //   - binding 0, location 1: R32G32B32_SFLOAT (color)
    //   - binding 1, location 2: R32G32_SFLOAT (per-instance offset, xy)
    let hex_vs = r#"
#version 450
layout(set = 0, binding = 0) uniform Camera {
    mat4 model;
    mat4 view;
    mat4 proj;
} u;

layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inColor;
layout(location = 2) in vec2 inOffset;

layout(location = 0) out vec3 vColor;

void main() {
    vec3 pos = inPos + vec3(inOffset, 0.0);
    gl_Position = u.proj * u.view * u.model * vec4(pos, 1.0);
    vColor = inColor;
}
"#;

    // Plain meshes: binding 0 only.
    let mesh_vs = r#"
#version 450
layout(set = 0, binding = 0) uniform Camera {
    mat4 model;
    mat4 view;
    mat4 proj;
} u;

layout(location = 0) in vec3 inPos;
layout(location = 1) in vec3 inColor;

layout(location = 0) out vec3 vColor;

void main() {
    gl_Position = u.proj * u.view * u.model * vec4(inPos, 1.0);
    vColor = inColor;
}
"#;

    let fs_src = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let shaders = [
        (hex_vs, shaderc::ShaderKind::Vertex, "hex.vert"),
        (mesh_vs, shaderc::ShaderKind::Vertex, "mesh.vert"),
        (fs_src, shaderc::ShaderKind::Fragment, "color.frag"),
    ];
    for (src, kind, name) in shaders {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap();
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }

    println!("cargo:rerun-if-changed=build.rs");
}
