// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::rc::Rc;

use super::{label_or_default, ResourceCore};
use crate::renderer::api::{FilterMode, ResourceKind, SamplerDescriptor};
use crate::renderer::device::shared::DeviceShared;
use crate::renderer::error::ResourceError;

const MAX_ANISOTROPY: u16 = 16;

/// Texture sampling state.
#[derive(Clone)]
pub struct Sampler {
    inner: Rc<SamplerInner>,
}

struct SamplerInner {
    core: ResourceCore,
    descriptor: SamplerDescriptor<'static>,
}

impl_gpu_resource!(Sampler, destroy);

pub(crate) fn validate_descriptor(descriptor: &SamplerDescriptor<'_>) -> Result<(), ResourceError> {
    if descriptor.max_anisotropy == 0 || descriptor.max_anisotropy > MAX_ANISOTROPY {
        return Err(ResourceError::InvalidDescriptor(format!(
            "max anisotropy {} outside 1..={MAX_ANISOTROPY}",
            descriptor.max_anisotropy
        )));
    }
    let all_linear = [
        descriptor.mag_filter,
        descriptor.min_filter,
        descriptor.mipmap_filter,
    ]
    .iter()
    .all(|filter| *filter == FilterMode::Linear);
    if descriptor.max_anisotropy > 1 && !all_linear {
        return Err(ResourceError::InvalidDescriptor(
            "anisotropic filtering requires linear mag, min and mipmap filters".into(),
        ));
    }
    if !(descriptor.lod_min_clamp >= 0.0 && descriptor.lod_min_clamp <= descriptor.lod_max_clamp) {
        return Err(ResourceError::InvalidDescriptor(format!(
            "invalid LOD clamp range {}..{}",
            descriptor.lod_min_clamp, descriptor.lod_max_clamp
        )));
    }
    Ok(())
}

impl Sampler {
    pub(crate) fn create(
        shared: &Rc<DeviceShared>,
        descriptor: &SamplerDescriptor<'_>,
    ) -> Result<Self, ResourceError> {
        validate_descriptor(descriptor)?;
        let handle = shared.backend.borrow_mut().create_sampler(descriptor)?;
        let label = label_or_default(descriptor.label.as_deref(), ResourceKind::Sampler);
        Ok(Self {
            inner: Rc::new(SamplerInner {
                core: ResourceCore::register(shared, ResourceKind::Sampler, handle, &label),
                descriptor: descriptor.clone().into_owned(),
            }),
        })
    }

    /// The descriptor the sampler was created from.
    pub fn descriptor(&self) -> &SamplerDescriptor<'static> {
        &self.inner.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anisotropy_requires_linear_filtering() {
        let mut desc = SamplerDescriptor {
            max_anisotropy: 8,
            ..Default::default()
        };
        assert!(validate_descriptor(&desc).is_err());

        desc.mag_filter = FilterMode::Linear;
        desc.min_filter = FilterMode::Linear;
        desc.mipmap_filter = FilterMode::Linear;
        assert!(validate_descriptor(&desc).is_ok());

        desc.max_anisotropy = 32;
        assert!(validate_descriptor(&desc).is_err());
    }

    #[test]
    fn test_lod_range() {
        let desc = SamplerDescriptor {
            lod_min_clamp: 4.0,
            lod_max_clamp: 2.0,
            ..Default::default()
        };
        assert!(validate_descriptor(&desc).is_err());
        assert!(validate_descriptor(&SamplerDescriptor::default()).is_ok());
    }
}
