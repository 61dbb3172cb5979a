//! Per-z-layer reaction bookkeeping: per-phase reaction counts, porosity,
//! and accumulated strain, one entry per z-layer of the padded grid.

/// Per-layer accounting for one reactive phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhaseLayerCounts {
    pub initial: u64,
    pub reacted: u64,
}

/// Per-layer accounting vectors for the whole engine.
#[derive(Clone, Debug)]
pub struct LayerAccounting {
    pub ch: Vec<PhaseLayerCounts>,
    pub c3ah6: Vec<PhaseLayerCounts>,
    pub afm: Vec<PhaseLayerCounts>,
    pub afmc: Vec<PhaseLayerCounts>,
    /// Capillary porosity voxel count, per layer.
    pub capillary_pores: Vec<i64>,
    /// Gel porosity (fractional), per layer.
    pub gel_pores: Vec<f64>,
    /// Accumulated strain from failed precipitations, per product, per layer.
    pub strain_ettringite: Vec<f64>,
    pub strain_gypsum: Vec<f64>,
    pub strain_afm: Vec<f64>,
    pub strain_brucite: Vec<f64>,
    /// Failed `removech` attempts ("Noch") per layer.
    pub noch: Vec<u64>,
}

impl LayerAccounting {
    pub fn new(nz: usize) -> Self {
        Self {
            ch: vec![PhaseLayerCounts::default(); nz],
            c3ah6: vec![PhaseLayerCounts::default(); nz],
            afm: vec![PhaseLayerCounts::default(); nz],
            afmc: vec![PhaseLayerCounts::default(); nz],
            capillary_pores: vec![0; nz],
            gel_pores: vec![0.0; nz],
            strain_ettringite: vec![0.0; nz],
            strain_gypsum: vec![0.0; nz],
            strain_afm: vec![0.0; nz],
            strain_brucite: vec![0.0; nz],
            noch: vec![0; nz],
        }
    }

    /// A single tab-separated plot line for layer `z`.
    pub fn plot_line(&self, z: usize, walkers_in_layer: u64) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            z,
            walkers_in_layer,
            self.ch[z].reacted,
            self.afm[z].reacted,
            self.c3ah6[z].reacted,
            self.capillary_pores[z],
            self.gel_pores[z],
            self.strain_brucite[z],
            self.strain_ettringite[z],
            self.strain_gypsum[z],
            self.strain_afm[z],
            self.ch[z].initial,
            self.afm[z].initial,
            self.c3ah6[z].initial,
        )
    }
}
