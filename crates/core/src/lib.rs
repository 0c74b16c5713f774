//! Face landmark visualization: capture frames, run a face mesh detector,
//! draw the mesh and show the result with a live frame rate.

pub mod capture {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure {
        pub mod ffmpeg_frame_source;
    }
}

pub mod detection {
    pub mod domain {
        pub mod face_box;
        pub mod face_detector;
        pub mod landmark;
        pub mod landmark_detector;
        pub mod mesh_topology;
    }
    pub mod infrastructure;
}

pub mod display {
    pub mod domain {
        pub mod display_surface;
    }
}

pub mod overlay {
    pub mod domain {
        pub mod overlay_renderer;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod display_loop;
    pub mod face_mesh_session;
    pub mod fps_meter;
    pub mod landmark_filter;
    pub mod pipeline_logger;
    pub mod screen_fit;
}

pub mod shared;
