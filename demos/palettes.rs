use std::{env,
          io::{BufWriter, Write},
          fs::File,
          error::Error};
use rgb::{RGB, RGB8, RGBA8};
use fits_atlas::{AlphaMode, ColorRange, Frame, Lut, Palette, ValueRange,
                 VIRIDIS, GNBU, PURD, YLGNBU, GRAYSCALE};
use fits_atlas::colorize::to_byte;

type Err = Box<dyn Error>;

fn to_rgb8(c: RGB<f64>) -> RGB8 {
    RGB8::new(to_byte(c.r), to_byte(c.g), to_byte(c.b))
}

fn gray(c: RGB8) -> RGB8 {
    let y = (0.299 * c.r as f64 + 0.587 * c.g as f64 + 0.114 * c.b as f64)
        .round() as u8;
    RGB8::new(y, y, y)
}

fn css_string(c: RGB8) -> String {
    format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
}

fn table_of_colors(fh: &mut impl Write, colors: &[RGB8],
                   width: u32, comment: &str) -> Result<(), Err> {
    writeln!(fh, "<table style=\"border: 0px;  border-spacing: 0px\"><tr>")?;
    for &c in colors {
        writeln!(fh, "  <td style=\"width: {width}px; height: 30px; \
                      background-color: {}\"></td>",
                css_string(c))?;
    }
    writeln!(fh, "<td rowspan=\"2\" style=\"padding-left: 7px\">\
                  {comment}</td></tr><tr>")?;
    for &c in colors {
        writeln!(fh, "  <td style=\"width: {width}px; height: 12px; \
                      background-color: {}\"></td>",
                 css_string(gray(c)))?;
    }
    writeln!(fh, "</tr></table><br/>")?;
    Ok(())
}

fn palette(fh: &mut impl Write, p: &Palette) -> Result<(), Err> {
    let lut = Lut::new(p)?;
    let table: Vec<_> = lut.table().iter().map(|&c| to_rgb8(c)).collect();
    table_of_colors(fh, &table, 9,
                    &format!("{} ({} samples)", p.name(), lut.samples()))?;
    let smooth: Vec<_> = p.range(0., 1., 150).map(|(_, c)| to_rgb8(c))
        .collect();
    table_of_colors(fh, &smooth, 2,
                    &format!("{} (interpolated)", p.name()))
}

fn image(fh: &mut impl Write, pixels: &[RGBA8], width: usize,
         comment: &str) -> Result<(), Err> {
    writeln!(fh, "<table style=\"border: 0px;  border-spacing: 0px; \
                  background: repeating-conic-gradient(#ccc 0% 25%, \
                  white 0% 50%) 50% / 16px 16px\">")?;
    for row in pixels.chunks(width) {
        write!(fh, "<tr>")?;
        for p in row {
            write!(fh, "<td style=\"width: 6px; height: 6px; \
                        background-color: rgba({}, {}, {}, {:.3})\"></td>",
                   p.r, p.g, p.b, p.a as f64 / 255.)?;
        }
        writeln!(fh, "</tr>")?;
    }
    writeln!(fh, "</table><p>{comment}</p>")?;
    Ok(())
}

/// A 32×32 frame with a bright source off center.
fn blob() -> Result<Frame, Err> {
    let n = 32;
    let values = (0 .. n * n).map(|i| {
        let (x, y) = ((i % n) as f64 - 12., (i / n) as f64 - 18.);
        1e3 * (-(x * x + y * y) / 40.).exp() + 5.
    }).collect();
    Ok(Frame::new(n, n, values)?)
}

fn main() -> Result<(), Err> {
    let mut fh = BufWriter::new(File::create("palettes.html")?);
    writeln!(fh, "<html>\n\
                  <head>\n\
                  <title>fits-atlas: {}</title>\n\
                  </head>\n\
                  <body>",
             env::args().next().unwrap_or_default())?;
    writeln!(fh, "<h3>Lookup tables</h3>")?;
    for p in [&*VIRIDIS, &*GNBU, &*PURD, &*YLGNBU, &*GRAYSCALE] {
        palette(&mut fh, p)?;
    }

    writeln!(fh, "<h3>A frame colored with viridis</h3>")?;
    let frame = blob()?;
    let range = ValueRange::of_values(frame.values().iter().copied())
        .unwrap_or_default();
    let lut = Lut::new(&VIRIDIS)?.with_range(range);
    for (mode, comment) in [(AlphaMode::Opaque, "Opaque, as selected."),
                            (AlphaMode::Transparent, "Transparent, as on the map.")] {
        let img = frame.colorize(&lut, mode);
        image(&mut fh, img.pixels(), img.width(), comment)?;
    }
    let bar = lut.color_bar(64);
    image(&mut fh, bar.pixels(), bar.width(), "Color bar.")?;

    writeln!(fh, "</body>\n\
                  </html>")?;
    Ok(())
}
