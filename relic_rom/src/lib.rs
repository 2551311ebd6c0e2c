//! Synth ROM identification for the MT-32 family.
//!
//! Identification is deliberately shallow: a static descriptor registry is
//! matched on file size, with the vendor name prefix steering collisions
//! between machine generations. Content digests are not consulted, matching
//! the behaviour of the shipping resource loaders this mirrors.

use std::fs::File;
use std::path::Path;

use log::debug;
use serde::Serialize;
use thiserror::Error;

/// File-name prefix Roland used for second-generation ROM dumps.
pub const CM32L_PREFIX: &str = "CM32L_";

/// Which chip the image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RomFamily {
    Control,
    Pcm,
}

/// How a dump relates to the complete ROM: a whole image, one half of a
/// split pair, or one of two byte-interleaved (multiplexed) chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RomPairing {
    Full,
    FirstHalf,
    SecondHalf,
    Mux0,
    Mux1,
}

/// Behavioural quirks implied by a control ROM generation. PCM images carry
/// the profile of the machine they shipped in so that name steering can
/// tell the generations apart at equal sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureSet {
    pub default_reverb_mt32_compatible: bool,
    pub old_mt32_analog_lpf: bool,
}

impl FeatureSet {
    pub fn old_mt32(&self) -> bool {
        self.default_reverb_mt32_compatible && self.old_mt32_analog_lpf
    }
}

const OLD_MT32: FeatureSet = FeatureSet {
    default_reverb_mt32_compatible: true,
    old_mt32_analog_lpf: true,
};

const SECOND_GEN: FeatureSet = FeatureSet {
    default_reverb_mt32_compatible: false,
    old_mt32_analog_lpf: false,
};

/// One known ROM image. All descriptors are static; identification hands
/// out `&'static` borrows and nothing is ever freed.
#[derive(Debug, Serialize)]
pub struct RomDescriptor {
    pub file_size: u64,
    pub family: RomFamily,
    pub pairing: RomPairing,
    /// Registry index of the other half of a split or muxed pair.
    pub companion: Option<usize>,
    pub features: FeatureSet,
    pub short_name: &'static str,
    pub description: &'static str,
}

impl RomDescriptor {
    pub fn companion_descriptor(&self) -> Option<&'static RomDescriptor> {
        self.companion.map(|index| &REGISTRY[index])
    }
}

/// Declaration order is the match order: first-generation MT-32 images come
/// before their same-sized CM-32L counterparts, and the name steer in
/// [`identify`] is what lets a CM32L_-prefixed file reach past them.
static REGISTRY: [RomDescriptor; 15] = [
    RomDescriptor {
        file_size: 65536,
        family: RomFamily::Control,
        pairing: RomPairing::Full,
        companion: None,
        features: OLD_MT32,
        short_name: "ctrl_mt32_1_04",
        description: "MT-32 Control v1.04",
    },
    RomDescriptor {
        file_size: 65536,
        family: RomFamily::Control,
        pairing: RomPairing::Full,
        companion: None,
        features: OLD_MT32,
        short_name: "ctrl_mt32_1_05",
        description: "MT-32 Control v1.05",
    },
    RomDescriptor {
        file_size: 65536,
        family: RomFamily::Control,
        pairing: RomPairing::Full,
        companion: None,
        features: OLD_MT32,
        short_name: "ctrl_mt32_1_06",
        description: "MT-32 Control v1.06",
    },
    RomDescriptor {
        file_size: 65536,
        family: RomFamily::Control,
        pairing: RomPairing::Full,
        companion: None,
        features: OLD_MT32,
        short_name: "ctrl_mt32_1_07",
        description: "MT-32 Control v1.07",
    },
    RomDescriptor {
        file_size: 65536,
        family: RomFamily::Control,
        pairing: RomPairing::Full,
        companion: None,
        features: OLD_MT32,
        short_name: "ctrl_mt32_bluer",
        description: "MT-32 Control BlueRidge",
    },
    RomDescriptor {
        file_size: 65536,
        family: RomFamily::Control,
        pairing: RomPairing::Full,
        companion: None,
        features: SECOND_GEN,
        short_name: "ctrl_cm32l_1_00",
        description: "CM-32L/LAPC-I Control v1.00",
    },
    RomDescriptor {
        file_size: 65536,
        family: RomFamily::Control,
        pairing: RomPairing::Full,
        companion: None,
        features: SECOND_GEN,
        short_name: "ctrl_cm32l_1_02",
        description: "CM-32L/LAPC-I Control v1.02",
    },
    // v1.07 also shipped split across two 32 KiB chips.
    RomDescriptor {
        file_size: 32768,
        family: RomFamily::Control,
        pairing: RomPairing::FirstHalf,
        companion: Some(8),
        features: OLD_MT32,
        short_name: "ctrl_mt32_1_07_a",
        description: "MT-32 Control v1.07, first half",
    },
    RomDescriptor {
        file_size: 32768,
        family: RomFamily::Control,
        pairing: RomPairing::SecondHalf,
        companion: Some(7),
        features: OLD_MT32,
        short_name: "ctrl_mt32_1_07_b",
        description: "MT-32 Control v1.07, second half",
    },
    RomDescriptor {
        file_size: 524288,
        family: RomFamily::Pcm,
        pairing: RomPairing::Full,
        companion: None,
        features: OLD_MT32,
        short_name: "pcm_mt32",
        description: "MT-32 PCM ROM",
    },
    // The CM-32L PCM chips are byte-interleaved halves of the 1 MiB image,
    // so each half collides with the full MT-32 PCM ROM at 512 KiB.
    RomDescriptor {
        file_size: 524288,
        family: RomFamily::Pcm,
        pairing: RomPairing::Mux0,
        companion: Some(11),
        features: SECOND_GEN,
        short_name: "pcm_cm32l_a",
        description: "CM-32L/CM-64/LAPC-I PCM ROM, even bytes",
    },
    RomDescriptor {
        file_size: 524288,
        family: RomFamily::Pcm,
        pairing: RomPairing::Mux1,
        companion: Some(10),
        features: SECOND_GEN,
        short_name: "pcm_cm32l_b",
        description: "CM-32L/CM-64/LAPC-I PCM ROM, odd bytes",
    },
    RomDescriptor {
        file_size: 262144,
        family: RomFamily::Pcm,
        pairing: RomPairing::Mux0,
        companion: Some(13),
        features: OLD_MT32,
        short_name: "pcm_mt32_a",
        description: "MT-32 PCM ROM, even bytes",
    },
    RomDescriptor {
        file_size: 262144,
        family: RomFamily::Pcm,
        pairing: RomPairing::Mux1,
        companion: Some(12),
        features: OLD_MT32,
        short_name: "pcm_mt32_b",
        description: "MT-32 PCM ROM, odd bytes",
    },
    RomDescriptor {
        file_size: 1048576,
        family: RomFamily::Pcm,
        pairing: RomPairing::Full,
        companion: None,
        features: SECOND_GEN,
        short_name: "pcm_cm32l",
        description: "CM-32L/CM-64/LAPC-I PCM ROM",
    },
];

/// Every descriptor this crate knows, in match order.
pub fn registry() -> &'static [RomDescriptor] {
    &REGISTRY
}

/// Resolve an image by size and display name. The first size match wins,
/// except that a name carrying the CM32L_ vendor prefix (any case) skips
/// descriptors with the old MT-32 feature profile. Returns `None` when the
/// registry has nothing of that size; callers treat that as an unsupported
/// resource, not a fault.
pub fn identify(byte_len: u64, name: &str) -> Option<&'static RomDescriptor> {
    let steer_second_gen = name
        .get(..CM32L_PREFIX.len())
        .map(|prefix| prefix.eq_ignore_ascii_case(CM32L_PREFIX))
        .unwrap_or(false);
    REGISTRY
        .iter()
        .find(|d| d.file_size == byte_len && !(steer_second_gen && d.features.old_mt32()))
}

/// Errors from binding a file to a descriptor.
#[derive(Debug, Error)]
pub enum RomIdentError {
    #[error("no ROM descriptor matches {size}-byte image {name:?}")]
    Unidentified { size: u64, name: String },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opened ROM file bound to its resolved descriptor. The handle is owned
/// exclusively; dropping the image closes it.
#[derive(Debug)]
pub struct RomImage {
    file: File,
    file_size: u64,
    descriptor: &'static RomDescriptor,
}

impl RomImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RomIdentError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let descriptor = identify(file_size, &name).ok_or(RomIdentError::Unidentified {
            size: file_size,
            name,
        })?;
        debug!(
            "{}: {} bytes resolved to {}",
            path.display(),
            file_size,
            descriptor.short_name
        );
        Ok(RomImage {
            file,
            file_size,
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &'static RomDescriptor {
        self.descriptor
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Hand the file handle back for callers that stream the payload.
    pub fn into_file(self) -> File {
        self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn first_size_match_wins_without_a_steer() {
        let d = identify(65536, "MT32_CONTROL.ROM").unwrap();
        assert_eq!(d.short_name, "ctrl_mt32_1_04");
        assert!(d.features.old_mt32());
    }

    #[test]
    fn cm32l_prefix_steers_past_old_mt32_descriptors() {
        let d = identify(65536, "CM32L_CONTROL.ROM").unwrap();
        assert_eq!(d.short_name, "ctrl_cm32l_1_00");
        assert_eq!(d.family, RomFamily::Control);
        assert!(!d.features.old_mt32());
    }

    #[test]
    fn prefix_steer_ignores_case() {
        let upper = identify(65536, "CM32L_CONTROL.ROM").unwrap();
        let lower = identify(65536, "cm32l_control.rom").unwrap();
        assert!(std::ptr::eq(upper, lower));
    }

    #[test]
    fn identification_is_deterministic() {
        let a = identify(524288, "MT32_PCM.ROM").unwrap();
        let b = identify(524288, "MT32_PCM.ROM").unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.short_name, "pcm_mt32");
    }

    #[test]
    fn pcm_size_collision_resolved_by_prefix() {
        let mt32 = identify(524288, "MT32_PCM.ROM").unwrap();
        assert_eq!(mt32.pairing, RomPairing::Full);
        let cm32l = identify(524288, "CM32L_PCM_A.ROM").unwrap();
        assert_eq!(cm32l.short_name, "pcm_cm32l_a");
        assert_eq!(cm32l.pairing, RomPairing::Mux0);
    }

    #[test]
    fn unknown_size_is_not_found() {
        assert!(identify(12345, "MT32_CONTROL.ROM").is_none());
        // The steer narrows candidates, it never widens them.
        assert!(identify(12345, "CM32L_CONTROL.ROM").is_none());
    }

    #[test]
    fn short_names_never_steer() {
        // Shorter than the prefix itself; must not panic or match oddly.
        assert_eq!(identify(65536, "a").unwrap().short_name, "ctrl_mt32_1_04");
        assert_eq!(identify(65536, "").unwrap().short_name, "ctrl_mt32_1_04");
    }

    #[test]
    fn companions_are_mutual() {
        for (index, descriptor) in registry().iter().enumerate() {
            if let Some(other) = descriptor.companion {
                assert_eq!(registry()[other].companion, Some(index));
                assert_eq!(registry()[other].file_size, descriptor.file_size);
                assert_eq!(registry()[other].family, descriptor.family);
            }
        }
    }

    #[test]
    fn control_halves_pair_up() {
        let first = identify(32768, "MT32_A.ROM").unwrap();
        assert_eq!(first.pairing, RomPairing::FirstHalf);
        let second = first.companion_descriptor().unwrap();
        assert_eq!(second.pairing, RomPairing::SecondHalf);
        assert!(std::ptr::eq(
            second.companion_descriptor().unwrap(),
            first
        ));
    }

    #[test]
    fn opens_and_identifies_a_rom_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CM32L_CONTROL.ROM");
        let mut file = File::create(&path).unwrap();
        file.write_all(&vec![0u8; 65536]).unwrap();
        drop(file);

        let image = RomImage::open(&path).unwrap();
        assert_eq!(image.file_size(), 65536);
        assert_eq!(image.descriptor().short_name, "ctrl_cm32l_1_00");
        assert_eq!(image.descriptor().description, "CM-32L/LAPC-I Control v1.00");
    }

    #[test]
    fn unknown_image_reports_size_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SCRATCH.ROM");
        std::fs::write(&path, b"not a rom").unwrap();

        match RomImage::open(&path) {
            Err(RomIdentError::Unidentified { size, name }) => {
                assert_eq!(size, 9);
                assert_eq!(name, "SCRATCH.ROM");
            }
            other => panic!("expected Unidentified, got {other:?}"),
        }
    }
}
